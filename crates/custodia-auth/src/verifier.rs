//! Withdrawal authorization: a chain of verification strategies.
//!
//! Strategies run in order and the first success wins. The default chain is
//! [`EoaStrategy`] followed by [`ContractWalletStrategy`]. When every
//! strategy fails the result is a single
//! [`CustodiaError::SignatureMismatch`] whose reason names each failure.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use custodia_types::{
    Amount, AssetDescriptor, CustodiaError, DomainConfig, Result, short_account,
};
use tracing::debug;

use crate::recover::recover_signer;
use crate::typed_data::{TypedDataHasher, WithdrawalAuthorization};
use crate::wallet::{ContractWalletVerifier, WalletDirectory};

/// Everything a strategy may look at.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    pub claimed_owner: Address,
    /// `keccak256(signing_payload)`.
    pub digest: B256,
    /// `0x19 0x01 || domainSeparator || structHash`.
    pub signing_payload: &'a [u8],
    pub signature: &'a [u8],
}

/// How an authorization was established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationMethod {
    /// The owner key signed the digest directly.
    Eoa,
    /// The owner is a contract wallet; these owners approved, ascending.
    ContractWallet { signers: Vec<Address> },
}

/// A verified claim: `owner` approved the withdrawal hashed to `digest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub owner: Address,
    pub digest: B256,
    pub method: AuthorizationMethod,
}

/// One way of proving that the claimed owner approved a request.
pub trait AuthorizationStrategy: Send + Sync {
    /// Short name used in logs and mismatch reasons.
    fn name(&self) -> &'static str;

    fn authorize(&self, request: &AuthorizationRequest<'_>) -> Result<AuthorizationMethod>;
}

/// Plain key-pair owners: the signature must recover to the claimed owner.
#[derive(Debug, Default, Clone, Copy)]
pub struct EoaStrategy;

impl AuthorizationStrategy for EoaStrategy {
    fn name(&self) -> &'static str {
        "eoa"
    }

    fn authorize(&self, request: &AuthorizationRequest<'_>) -> Result<AuthorizationMethod> {
        let signer = recover_signer(&request.digest, request.signature)?;
        if signer == request.claimed_owner {
            Ok(AuthorizationMethod::Eoa)
        } else {
            Err(CustodiaError::SignerMismatch {
                expected: request.claimed_owner,
                recovered: signer,
            })
        }
    }
}

/// Contract-wallet owners: M-of-N owner signatures over the wallet's digest
/// of the signing payload.
pub struct ContractWalletStrategy {
    directory: Arc<dyn WalletDirectory>,
}

impl ContractWalletStrategy {
    #[must_use]
    pub fn new(directory: Arc<dyn WalletDirectory>) -> Self {
        Self { directory }
    }
}

impl AuthorizationStrategy for ContractWalletStrategy {
    fn name(&self) -> &'static str {
        "contract-wallet"
    }

    fn authorize(&self, request: &AuthorizationRequest<'_>) -> Result<AuthorizationMethod> {
        let signers = ContractWalletVerifier::verify(
            self.directory.as_ref(),
            request.claimed_owner,
            request.signing_payload,
            request.signature,
        )?;
        Ok(AuthorizationMethod::ContractWallet { signers })
    }
}

/// Verifies withdrawal authorizations for one settlement domain.
pub struct AuthorizationVerifier {
    hasher: TypedDataHasher,
    strategies: Vec<Box<dyn AuthorizationStrategy>>,
}

impl AuthorizationVerifier {
    /// The default chain: EOA, then contract wallet.
    #[must_use]
    pub fn new(domain: &DomainConfig, wallets: Arc<dyn WalletDirectory>) -> Self {
        Self::with_strategies(
            domain,
            vec![
                Box::new(EoaStrategy),
                Box::new(ContractWalletStrategy::new(wallets)),
            ],
        )
    }

    /// A custom chain, tried in the given order.
    #[must_use]
    pub fn with_strategies(
        domain: &DomainConfig,
        strategies: Vec<Box<dyn AuthorizationStrategy>>,
    ) -> Self {
        Self {
            hasher: TypedDataHasher::new(domain),
            strategies,
        }
    }

    #[must_use]
    pub fn hasher(&self) -> &TypedDataHasher {
        &self.hasher
    }

    /// Check that `claimed_owner` authorized withdrawing `amount` of `asset` at `nonce`.
    pub fn verify(
        &self,
        claimed_owner: Address,
        nonce: u64,
        asset: &AssetDescriptor,
        amount: Amount,
        signature: &[u8],
    ) -> Result<Authorization> {
        let message = WithdrawalAuthorization::new(nonce, *asset, amount).to_typed();
        let signing_payload = self.hasher.signing_payload(&message);
        let digest = alloy_primitives::keccak256(signing_payload);
        let request = AuthorizationRequest {
            claimed_owner,
            digest,
            signing_payload: &signing_payload,
            signature,
        };

        let mut failures = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            match strategy.authorize(&request) {
                Ok(method) => {
                    debug!(
                        owner = %short_account(&claimed_owner),
                        strategy = strategy.name(),
                        nonce,
                        "Withdrawal authorized"
                    );
                    return Ok(Authorization {
                        owner: claimed_owner,
                        digest,
                        method,
                    });
                }
                Err(err) => failures.push(format!("{}: {err}", strategy.name())),
            }
        }

        debug!(
            owner = %short_account(&claimed_owner),
            nonce,
            "All authorization strategies rejected signature"
        );
        Err(CustodiaError::SignatureMismatch {
            owner: claimed_owner,
            reason: if failures.is_empty() {
                "no authorization strategy configured".into()
            } else {
                failures.join("; ")
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestSigner, concat_sorted};
    use crate::wallet::{InMemoryWalletDirectory, WalletOwnerSet};
    use alloy_primitives::U256;

    const WALLET: Address = Address::repeat_byte(0xaa);

    fn asset() -> AssetDescriptor {
        AssetDescriptor::fungible(Address::repeat_byte(0x11))
    }

    fn verifier_with(dir: Arc<InMemoryWalletDirectory>) -> AuthorizationVerifier {
        AuthorizationVerifier::new(&DomainConfig::default(), dir)
    }

    fn payload(v: &AuthorizationVerifier, nonce: u64, amount: U256) -> [u8; 66] {
        v.hasher()
            .signing_payload(&WithdrawalAuthorization::new(nonce, asset(), amount).to_typed())
    }

    #[test]
    fn eoa_owner_authorized() {
        let v = verifier_with(Arc::new(InMemoryWalletDirectory::new()));
        let owner = TestSigner::random();
        let sig = owner.sign_withdrawal(
            v.hasher(),
            &WithdrawalAuthorization::new(0, asset(), U256::from(7)),
        );
        let auth = v.verify(owner.address(), 0, &asset(), U256::from(7), &sig).unwrap();
        assert_eq!(auth.owner, owner.address());
        assert_eq!(auth.method, AuthorizationMethod::Eoa);
    }

    #[test]
    fn wrong_nonce_or_amount_is_mismatch() {
        let v = verifier_with(Arc::new(InMemoryWalletDirectory::new()));
        let owner = TestSigner::random();
        let sig = owner.sign_withdrawal(
            v.hasher(),
            &WithdrawalAuthorization::new(0, asset(), U256::from(7)),
        );
        for (nonce, amount) in [(1u64, 7u64), (0, 8)] {
            let err = v
                .verify(owner.address(), nonce, &asset(), U256::from(amount), &sig)
                .unwrap_err();
            assert!(
                matches!(err, CustodiaError::SignatureMismatch { owner: o, .. } if o == owner.address())
            );
        }
    }

    #[test]
    fn other_key_is_mismatch_naming_both_strategies() {
        let v = verifier_with(Arc::new(InMemoryWalletDirectory::new()));
        let owner = TestSigner::random();
        let thief = TestSigner::random();
        let sig = thief.sign_withdrawal(
            v.hasher(),
            &WithdrawalAuthorization::new(0, asset(), U256::from(1)),
        );
        let err = v.verify(owner.address(), 0, &asset(), U256::from(1), &sig).unwrap_err();
        let CustodiaError::SignatureMismatch { reason, .. } = &err else {
            panic!("expected mismatch, got {err}");
        };
        assert!(reason.contains("eoa:"));
        assert!(reason.contains("contract-wallet:"));
        assert_eq!(err.code(), "CU_ERR_103");
    }

    #[test]
    fn foreign_signer_is_signer_mismatch_not_recovery_failure() {
        let v = verifier_with(Arc::new(InMemoryWalletDirectory::new()));
        let owner = TestSigner::random();
        let thief = TestSigner::random();
        let msg = WithdrawalAuthorization::new(0, asset(), U256::from(1)).to_typed();
        let digest = v.hasher().digest(&msg);
        let payload = v.hasher().signing_payload(&msg);
        let sig = thief.sign_digest(&digest);
        let request = AuthorizationRequest {
            claimed_owner: owner.address(),
            digest,
            signing_payload: &payload,
            signature: &sig,
        };
        let err = EoaStrategy.authorize(&request).unwrap_err();
        assert!(matches!(
            err,
            CustodiaError::SignerMismatch { expected, recovered }
                if expected == owner.address() && recovered == thief.address()
        ));

        let err = v.verify(owner.address(), 0, &asset(), U256::from(1), &sig).unwrap_err();
        let CustodiaError::SignatureMismatch { reason, .. } = err else {
            panic!("expected mismatch");
        };
        assert!(reason.contains("CU_ERR_104"), "{reason}");
        assert!(!reason.contains("CU_ERR_102"), "{reason}");
    }

    #[test]
    fn malformed_signature_is_mismatch() {
        let v = verifier_with(Arc::new(InMemoryWalletDirectory::new()));
        let err = v
            .verify(Address::repeat_byte(1), 0, &asset(), U256::from(1), &[0u8; 12])
            .unwrap_err();
        assert!(matches!(err, CustodiaError::SignatureMismatch { .. }));
    }

    #[test]
    fn contract_wallet_authorized_after_eoa_fails() {
        let dir = Arc::new(InMemoryWalletDirectory::new());
        let a = TestSigner::random();
        let b = TestSigner::random();
        dir.register(
            WALLET,
            WalletOwnerSet::new([a.address(), b.address()], 2).unwrap(),
        );
        let v = verifier_with(dir.clone());
        let payload = payload(&v, 0, U256::from(5));
        let blob = concat_sorted(dir.as_ref(), WALLET, &payload, &[&a, &b]);

        let auth = v.verify(WALLET, 0, &asset(), U256::from(5), &blob).unwrap();
        let AuthorizationMethod::ContractWallet { signers } = auth.method else {
            panic!("expected wallet authorization");
        };
        assert_eq!(signers.len(), 2);
        assert!(signers[0] < signers[1]);
    }

    #[test]
    fn wallet_signature_for_other_nonce_rejected() {
        let dir = Arc::new(InMemoryWalletDirectory::new());
        let a = TestSigner::random();
        dir.register(WALLET, WalletOwnerSet::new([a.address()], 1).unwrap());
        let v = verifier_with(dir.clone());
        let blob = concat_sorted(dir.as_ref(), WALLET, &payload(&v, 1, U256::from(5)), &[&a]);
        assert!(matches!(
            v.verify(WALLET, 0, &asset(), U256::from(5), &blob),
            Err(CustodiaError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn eoa_only_chain_ignores_wallets() {
        let dir = Arc::new(InMemoryWalletDirectory::new());
        let a = TestSigner::random();
        dir.register(WALLET, WalletOwnerSet::new([a.address()], 1).unwrap());
        let v = AuthorizationVerifier::with_strategies(
            &DomainConfig::default(),
            vec![Box::new(EoaStrategy)],
        );
        let blob = concat_sorted(dir.as_ref(), WALLET, &payload(&v, 0, U256::from(5)), &[&a]);
        let err = v.verify(WALLET, 0, &asset(), U256::from(5), &blob).unwrap_err();
        let CustodiaError::SignatureMismatch { reason, .. } = err else {
            panic!("expected mismatch");
        };
        assert!(!reason.contains("contract-wallet"));
    }

    #[test]
    fn empty_chain_rejects_everything() {
        let v = AuthorizationVerifier::with_strategies(&DomainConfig::default(), Vec::new());
        assert!(matches!(
            v.verify(Address::repeat_byte(1), 0, &asset(), U256::from(1), &[0u8; 65]),
            Err(CustodiaError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn multi_token_uses_position_schema() {
        let v = verifier_with(Arc::new(InMemoryWalletDirectory::new()));
        let owner = TestSigner::random();
        let position = AssetDescriptor::multi_token(Address::repeat_byte(0x33), U256::from(42));
        let auth = WithdrawalAuthorization::new(3, position, U256::from(2));
        let sig = owner.sign_withdrawal(v.hasher(), &auth);
        assert!(v.verify(owner.address(), 3, &position, U256::from(2), &sig).is_ok());
        // Same signature does not authorize another position id.
        let other = AssetDescriptor::multi_token(Address::repeat_byte(0x33), U256::from(43));
        assert!(v.verify(owner.address(), 3, &other, U256::from(2), &sig).is_err());
    }
}
