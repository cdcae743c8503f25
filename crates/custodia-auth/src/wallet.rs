//! Contract-wallet (multisig) signature verification.
//!
//! A wallet signature is a concatenation of 65-byte owner signatures over
//! the wallet's own digest of the settlement signing payload. Signers must
//! be owners and strictly ascending by address, which also rules out
//! duplicates. At least `threshold` of them are required.

use std::collections::{BTreeSet, HashMap};

use alloy_primitives::{Address, B256};
use custodia_types::{CustodiaError, Result, constants, short_account};
use parking_lot::RwLock;
use tracing::debug;

use crate::recover::recover_signer;
use crate::typed_data::{DOMAIN_STRUCT, TypedDataHasher, TypedStruct, TypedValue};

/// Struct name of the wallet's message wrapper.
pub const SAFE_MESSAGE: &str = "SafeMessage";

/// Owners and approval threshold of one contract wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletOwnerSet {
    owners: BTreeSet<Address>,
    threshold: usize,
}

impl WalletOwnerSet {
    /// Requires `1 <= threshold <= owners.len()`.
    pub fn new(owners: impl IntoIterator<Item = Address>, threshold: usize) -> Result<Self> {
        let owners: BTreeSet<Address> = owners.into_iter().collect();
        if threshold == 0 {
            return Err(CustodiaError::Configuration(
                "wallet threshold must be at least 1".into(),
            ));
        }
        if threshold > owners.len() {
            return Err(CustodiaError::Configuration(format!(
                "wallet threshold {threshold} exceeds {} owners",
                owners.len()
            )));
        }
        Ok(Self { owners, threshold })
    }

    #[must_use]
    pub fn owners(&self) -> &BTreeSet<Address> {
        &self.owners
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn is_owner(&self, account: &Address) -> bool {
        self.owners.contains(account)
    }
}

/// The wallet's domain: `EIP712Domain(address verifyingContract)`.
#[must_use]
pub fn safe_domain(wallet: Address) -> TypedStruct {
    TypedStruct::new(DOMAIN_STRUCT).field("verifyingContract", TypedValue::Address(wallet))
}

/// The digest a wallet's owners sign to approve `payload`.
#[must_use]
pub fn safe_message_digest(wallet: Address, payload: &[u8]) -> B256 {
    let message = TypedStruct::new(SAFE_MESSAGE).field("message", TypedValue::Bytes(payload.to_vec()));
    TypedDataHasher::from_domain(safe_domain(wallet)).digest(&message)
}

/// Lookup of contract wallets known to the engine.
pub trait WalletDirectory: Send + Sync {
    /// Snapshot of the wallet's owner set, or `None` if `wallet` is not a contract wallet.
    fn owner_set(&self, wallet: &Address) -> Option<WalletOwnerSet>;

    /// The digest the wallet's owners sign for `payload`.
    fn message_digest(&self, wallet: &Address, payload: &[u8]) -> B256 {
        safe_message_digest(*wallet, payload)
    }
}

/// Thread-safe in-memory [`WalletDirectory`].
#[derive(Debug, Default)]
pub struct InMemoryWalletDirectory {
    wallets: RwLock<HashMap<Address, WalletOwnerSet>>,
}

impl InMemoryWalletDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a wallet's owner set.
    pub fn register(&self, wallet: Address, owners: WalletOwnerSet) {
        self.wallets.write().insert(wallet, owners);
    }

    pub fn remove(&self, wallet: &Address) -> Option<WalletOwnerSet> {
        self.wallets.write().remove(wallet)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.wallets.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wallets.read().is_empty()
    }
}

impl WalletDirectory for InMemoryWalletDirectory {
    fn owner_set(&self, wallet: &Address) -> Option<WalletOwnerSet> {
        self.wallets.read().get(wallet).cloned()
    }
}

/// Verifies M-of-N owner signatures against a [`WalletDirectory`].
pub struct ContractWalletVerifier;

impl ContractWalletVerifier {
    /// Check `signatures` as `wallet`'s approval of `payload`.
    ///
    /// Returns the recovered signers in ascending order.
    pub fn verify(
        directory: &dyn WalletDirectory,
        wallet: Address,
        payload: &[u8],
        signatures: &[u8],
    ) -> Result<Vec<Address>> {
        // One snapshot per attempt; concurrent owner changes never mix in.
        let owner_set = directory
            .owner_set(&wallet)
            .ok_or(CustodiaError::UnknownWallet(wallet))?;

        if signatures.is_empty() || signatures.len() % constants::SIGNATURE_LEN != 0 {
            return Err(CustodiaError::InvalidSignatureFormat {
                len: signatures.len(),
            });
        }

        let digest = directory.message_digest(&wallet, payload);
        let mut signers: Vec<Address> = Vec::with_capacity(signatures.len() / constants::SIGNATURE_LEN);
        for chunk in signatures.chunks_exact(constants::SIGNATURE_LEN) {
            let signer = recover_signer(&digest, chunk)?;
            if !owner_set.is_owner(&signer) {
                return Err(CustodiaError::UnknownSigner(signer));
            }
            if let Some(&previous) = signers.last() {
                if signer <= previous {
                    return Err(CustodiaError::SignerOrderViolation {
                        previous,
                        current: signer,
                    });
                }
            }
            signers.push(signer);
        }

        if signers.len() < owner_set.threshold() {
            return Err(CustodiaError::InsufficientSignatures {
                provided: signers.len(),
                threshold: owner_set.threshold(),
            });
        }

        debug!(
            wallet = %short_account(&wallet),
            signers = signers.len(),
            threshold = owner_set.threshold(),
            "Contract wallet signature accepted"
        );
        Ok(signers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestSigner, concat_sorted};
    use alloy_primitives::b256;

    const WALLET: Address = Address::repeat_byte(0xaa);
    const PAYLOAD: &[u8] = b"\x19\x01settlement-payload";

    fn setup(n: usize, threshold: usize) -> (InMemoryWalletDirectory, Vec<TestSigner>) {
        let mut signers: Vec<TestSigner> = (0..n).map(|_| TestSigner::random()).collect();
        signers.sort_by_key(TestSigner::address);
        let dir = InMemoryWalletDirectory::new();
        dir.register(
            WALLET,
            WalletOwnerSet::new(signers.iter().map(TestSigner::address), threshold).unwrap(),
        );
        (dir, signers)
    }

    fn sign_all(dir: &InMemoryWalletDirectory, signers: &[&TestSigner]) -> Vec<Vec<u8>> {
        signers
            .iter()
            .map(|s| s.sign_wallet_message(dir, WALLET, PAYLOAD).to_vec())
            .collect()
    }

    #[test]
    fn safe_type_hashes() {
        assert_eq!(
            safe_domain(WALLET).type_hash(),
            b256!("035aff83d86937d35b32e04f0ddc6ff469290eef2f1b692d8a815c89404d4749")
        );
        let msg = TypedStruct::new(SAFE_MESSAGE).field("message", TypedValue::Bytes(vec![]));
        assert_eq!(
            msg.type_hash(),
            b256!("60b3cbf8b4a223d68d641b3b6ddf9a298e7f33710cf3d3a9d1146b5a6150fbca")
        );
    }

    #[test]
    fn wallet_digest_depends_on_wallet_and_payload() {
        let d = safe_message_digest(WALLET, PAYLOAD);
        assert_ne!(d, safe_message_digest(Address::repeat_byte(0xbb), PAYLOAD));
        assert_ne!(d, safe_message_digest(WALLET, b"other"));
    }

    #[test]
    fn owner_set_rejects_bad_threshold() {
        let owners = [Address::repeat_byte(1), Address::repeat_byte(2)];
        assert!(matches!(
            WalletOwnerSet::new(owners, 0),
            Err(CustodiaError::Configuration(_))
        ));
        assert!(matches!(
            WalletOwnerSet::new(owners, 3),
            Err(CustodiaError::Configuration(_))
        ));
        assert!(WalletOwnerSet::new(owners, 2).is_ok());
    }

    #[test]
    fn two_of_two_ascending_accepted() {
        let (dir, signers) = setup(2, 2);
        let sigs = sign_all(&dir, &[&signers[0], &signers[1]]);
        let blob = [sigs[0].clone(), sigs[1].clone()].concat();
        let got = ContractWalletVerifier::verify(&dir, WALLET, PAYLOAD, &blob).unwrap();
        assert_eq!(got, vec![signers[0].address(), signers[1].address()]);
    }

    #[test]
    fn reversed_order_rejected() {
        let (dir, signers) = setup(2, 2);
        let sigs = sign_all(&dir, &[&signers[0], &signers[1]]);
        let blob = [sigs[1].clone(), sigs[0].clone()].concat();
        let err = ContractWalletVerifier::verify(&dir, WALLET, PAYLOAD, &blob).unwrap_err();
        assert!(matches!(err, CustodiaError::SignerOrderViolation { .. }), "{err}");
    }

    #[test]
    fn duplicate_signer_rejected() {
        let (dir, signers) = setup(2, 1);
        let sig = signers[0].sign_wallet_message(&dir, WALLET, PAYLOAD);
        let blob = [sig, sig].concat();
        let err = ContractWalletVerifier::verify(&dir, WALLET, PAYLOAD, &blob).unwrap_err();
        assert!(matches!(
            err,
            CustodiaError::SignerOrderViolation { previous, current } if previous == current
        ));
    }

    #[test]
    fn below_threshold_rejected() {
        let (dir, signers) = setup(3, 2);
        let blob = signers[1].sign_wallet_message(&dir, WALLET, PAYLOAD);
        let err = ContractWalletVerifier::verify(&dir, WALLET, PAYLOAD, &blob).unwrap_err();
        assert!(matches!(
            err,
            CustodiaError::InsufficientSignatures {
                provided: 1,
                threshold: 2
            }
        ));
    }

    #[test]
    fn non_owner_rejected() {
        let (dir, _) = setup(2, 1);
        let outsider = TestSigner::random();
        let blob = outsider.sign_wallet_message(&dir, WALLET, PAYLOAD);
        let err = ContractWalletVerifier::verify(&dir, WALLET, PAYLOAD, &blob).unwrap_err();
        assert!(matches!(err, CustodiaError::UnknownSigner(a) if a == outsider.address()));
    }

    #[test]
    fn unknown_wallet_rejected() {
        let dir = InMemoryWalletDirectory::new();
        let err =
            ContractWalletVerifier::verify(&dir, WALLET, PAYLOAD, &[0u8; 65]).unwrap_err();
        assert!(matches!(err, CustodiaError::UnknownWallet(w) if w == WALLET));
    }

    #[test]
    fn blob_length_must_be_multiple_of_65() {
        let (dir, _) = setup(1, 1);
        for len in [0usize, 64, 66, 129] {
            let err = ContractWalletVerifier::verify(&dir, WALLET, PAYLOAD, &vec![1u8; len])
                .unwrap_err();
            assert!(matches!(err, CustodiaError::InvalidSignatureFormat { .. }));
        }
    }

    #[test]
    fn signatures_over_other_payload_rejected() {
        let (dir, signers) = setup(1, 1);
        let blob = signers[0].sign_wallet_message(&dir, WALLET, b"different");
        // Recovers some unrelated address, which is not an owner.
        let err = ContractWalletVerifier::verify(&dir, WALLET, PAYLOAD, &blob).unwrap_err();
        assert!(matches!(
            err,
            CustodiaError::UnknownSigner(_) | CustodiaError::RecoveryFailure { .. }
        ));
    }

    #[test]
    fn concat_sorted_orders_by_address() {
        let (dir, signers) = setup(3, 3);
        let blob = concat_sorted(&dir, WALLET, PAYLOAD, &[&signers[2], &signers[0], &signers[1]]);
        assert!(ContractWalletVerifier::verify(&dir, WALLET, PAYLOAD, &blob).is_ok());
    }

    #[test]
    fn directory_register_and_remove() {
        let dir = InMemoryWalletDirectory::new();
        assert!(dir.is_empty());
        dir.register(WALLET, WalletOwnerSet::new([Address::repeat_byte(1)], 1).unwrap());
        assert_eq!(dir.len(), 1);
        assert!(dir.owner_set(&WALLET).is_some());
        assert!(dir.remove(&WALLET).is_some());
        assert!(dir.owner_set(&WALLET).is_none());
    }
}
