//! Signing helpers for tests. Only compiled with `test-helpers`.

use alloy_primitives::{Address, B256};
use k256::ecdsa::SigningKey;

use crate::personal::{personal_message_hash, withdrawal_message};
use crate::recover::address_from_verifying_key;
use crate::typed_data::{TypedDataHasher, WithdrawalAuthorization};
use crate::wallet::WalletDirectory;
use custodia_types::{Amount, constants};

/// A secp256k1 key that signs the way wallets do: `r || s || v`, `v ∈ {27, 28}`, low-s.
#[derive(Clone)]
pub struct TestSigner {
    key: SigningKey,
    address: Address,
}

impl TestSigner {
    #[must_use]
    pub fn random() -> Self {
        Self::from_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// # Panics
    /// If `secret` is not a valid scalar.
    #[must_use]
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self::from_key(SigningKey::from_slice(secret).expect("valid secp256k1 secret"))
    }

    fn from_key(key: SigningKey) -> Self {
        let address = address_from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// # Panics
    /// Never for a 32-byte digest.
    #[must_use]
    pub fn sign_digest(&self, digest: &B256) -> [u8; 65] {
        let (sig, rid) = self
            .key
            .sign_prehash_recoverable(digest.as_slice())
            .expect("prehash signing");
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = rid.to_byte() + constants::V_LOW;
        out
    }

    /// Typed-data signature over a withdrawal authorization.
    #[must_use]
    pub fn sign_withdrawal(&self, hasher: &TypedDataHasher, auth: &WithdrawalAuthorization) -> [u8; 65] {
        self.sign_digest(&hasher.digest(&auth.to_typed()))
    }

    /// Personal-message signature over `(asset, amount)`.
    #[must_use]
    pub fn sign_personal(&self, asset: Address, amount: Amount) -> [u8; 65] {
        self.sign_digest(&personal_message_hash(&withdrawal_message(asset, amount)))
    }

    /// This owner's contribution to `wallet`'s approval of `payload`.
    #[must_use]
    pub fn sign_wallet_message(
        &self,
        directory: &dyn WalletDirectory,
        wallet: Address,
        payload: &[u8],
    ) -> [u8; 65] {
        self.sign_digest(&directory.message_digest(&wallet, payload))
    }
}

impl std::fmt::Debug for TestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSigner").field("address", &self.address).finish_non_exhaustive()
    }
}

/// Concatenate wallet-owner signatures in ascending signer order.
#[must_use]
pub fn concat_sorted(
    directory: &dyn WalletDirectory,
    wallet: Address,
    payload: &[u8],
    signers: &[&TestSigner],
) -> Vec<u8> {
    let mut sorted: Vec<&TestSigner> = signers.to_vec();
    sorted.sort_by_key(|s| s.address());
    sorted
        .iter()
        .flat_map(|s| s.sign_wallet_message(directory, wallet, payload))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recover::recover_signer;
    use alloy_primitives::{address, hex};

    #[test]
    fn known_key_address() {
        let secret: [u8; 32] =
            hex::decode("4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d")
                .unwrap()
                .try_into()
                .unwrap();
        assert_eq!(
            TestSigner::from_bytes(&secret).address(),
            address!("90f8bf6a479f320ead074411a4b0e7944ea8c9c1")
        );
    }

    #[test]
    fn signatures_recover_and_are_canonical() {
        let signer = TestSigner::random();
        for i in 0u8..8 {
            let digest = B256::repeat_byte(i);
            let sig = signer.sign_digest(&digest);
            assert!(sig[64] == 27 || sig[64] == 28);
            assert_eq!(recover_signer(&digest, &sig).unwrap(), signer.address());
        }
    }
}
