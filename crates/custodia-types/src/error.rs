//! Error types for the Custodia settlement ledger.
//!
//! All errors use the `CU_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Signature errors
//! - 2xx: Contract-wallet errors
//! - 3xx: Ledger / nonce errors
//! - 4xx: Access-control errors
//! - 5xx: Asset collaborator errors
//! - 6xx: Invariant errors
//! - 9xx: General / internal errors

use alloy_primitives::{Address, U256};
use thiserror::Error;

/// Central error enum for all Custodia operations.
#[derive(Debug, Error)]
pub enum CustodiaError {
    // =================================================================
    // Signature Errors (1xx)
    // =================================================================
    /// The signature blob has the wrong length.
    #[error("CU_ERR_100: Invalid signature format: {len} bytes")]
    InvalidSignatureFormat { len: usize },

    /// The recovery byte is not one of the two legal values.
    #[error("CU_ERR_101: Invalid signature encoding: v = {v}")]
    InvalidSignatureEncoding { v: u8 },

    /// Public-key recovery is mathematically inconsistent (zero or high `s`, bad point, ...).
    #[error("CU_ERR_102: Signature recovery failed: {reason}")]
    RecoveryFailure { reason: String },

    /// Neither the EOA path nor the contract-wallet path authorized the claimed owner.
    #[error("CU_ERR_103: signature does not match owner {owner}: {reason}")]
    SignatureMismatch { owner: Address, reason: String },

    /// A well-formed signature recovered to someone other than the claimed owner.
    #[error("CU_ERR_104: Signer mismatch: recovered {recovered}, expected {expected}")]
    SignerMismatch { expected: Address, recovered: Address },

    // =================================================================
    // Contract-Wallet Errors (2xx)
    // =================================================================
    /// A wallet signature was produced by a key outside the owner set.
    #[error("CU_ERR_200: Unknown wallet signer: {0}")]
    UnknownSigner(Address),

    /// Fewer distinct owner signatures than the wallet threshold.
    #[error("CU_ERR_201: Insufficient signatures: {provided} provided, threshold {threshold}")]
    InsufficientSignatures { provided: usize, threshold: usize },

    /// Wallet signers are not strictly ascending (duplicate or out of order).
    #[error("CU_ERR_202: Signer order violation: {current} is not above {previous}")]
    SignerOrderViolation { previous: Address, current: Address },

    /// The claimed owner is not a known contract wallet.
    #[error("CU_ERR_203: Unknown contract wallet: {0}")]
    UnknownWallet(Address),

    // =================================================================
    // Ledger / Nonce Errors (3xx)
    // =================================================================
    /// Not enough balance to perform the debit.
    #[error("CU_ERR_300: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: U256, available: U256 },

    /// A credit would overflow the 256-bit balance.
    #[error("CU_ERR_301: Balance overflow")]
    BalanceOverflow,

    /// The nonce the authorization was signed for is no longer current.
    #[error("CU_ERR_302: Stale nonce: signed for {signed}, current is {current}")]
    StaleNonce { signed: u64, current: u64 },

    /// The owner already has a release in flight; it must settle first.
    #[error("CU_ERR_303: Release pending for {owner}")]
    ReleasePending { owner: Address },

    // =================================================================
    // Access-Control Errors (4xx)
    // =================================================================
    /// Only the designated operator may submit withdrawals.
    #[error("CU_ERR_400: Unauthorized caller: {caller}")]
    Unauthorized { caller: Address },

    // =================================================================
    // Asset Collaborator Errors (5xx)
    // =================================================================
    /// The external asset contract rejected an inbound or outbound transfer.
    #[error("CU_ERR_500: Asset transfer failed: {reason}")]
    AssetTransferFailure { reason: String },

    /// The asset descriptor is malformed (e.g. a fungible asset with a token id).
    #[error("CU_ERR_501: Invalid asset: {0}")]
    InvalidAsset(String),

    // =================================================================
    // Invariant Errors (6xx)
    // =================================================================
    /// Supply conservation invariant violated. Critical safety alert.
    #[error("CU_ERR_600: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CU_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CU_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("CU_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk).
    #[error("CU_ERR_903: I/O error: {0}")]
    Io(String),

    /// Persisted state is unreadable or corrupt.
    #[error("CU_ERR_904: Storage error: {0}")]
    Storage(String),
}

impl CustodiaError {
    /// The stable `CU_ERR_nnn` discriminator of this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSignatureFormat { .. } => "CU_ERR_100",
            Self::InvalidSignatureEncoding { .. } => "CU_ERR_101",
            Self::RecoveryFailure { .. } => "CU_ERR_102",
            Self::SignatureMismatch { .. } => "CU_ERR_103",
            Self::SignerMismatch { .. } => "CU_ERR_104",
            Self::UnknownSigner(_) => "CU_ERR_200",
            Self::InsufficientSignatures { .. } => "CU_ERR_201",
            Self::SignerOrderViolation { .. } => "CU_ERR_202",
            Self::UnknownWallet(_) => "CU_ERR_203",
            Self::InsufficientBalance { .. } => "CU_ERR_300",
            Self::BalanceOverflow => "CU_ERR_301",
            Self::StaleNonce { .. } => "CU_ERR_302",
            Self::ReleasePending { .. } => "CU_ERR_303",
            Self::Unauthorized { .. } => "CU_ERR_400",
            Self::AssetTransferFailure { .. } => "CU_ERR_500",
            Self::InvalidAsset(_) => "CU_ERR_501",
            Self::SupplyInvariantViolation { .. } => "CU_ERR_600",
            Self::Internal(_) => "CU_ERR_900",
            Self::Serialization(_) => "CU_ERR_901",
            Self::Configuration(_) => "CU_ERR_902",
            Self::Io(_) => "CU_ERR_903",
            Self::Storage(_) => "CU_ERR_904",
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CustodiaError>;

// Conversion from std::io::Error
impl From<std::io::Error> for CustodiaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CustodiaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = CustodiaError::InvalidSignatureFormat { len: 64 };
        let msg = format!("{err}");
        assert!(msg.starts_with("CU_ERR_100"), "Got: {msg}");
        assert!(msg.contains("64"));
    }

    #[test]
    fn insufficient_balance_display() {
        let err = CustodiaError::InsufficientBalance {
            needed: U256::from(100),
            available: U256::from(50),
        };
        let msg = format!("{err}");
        assert!(msg.contains("CU_ERR_300"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn signature_mismatch_mentions_owner() {
        let owner = Address::from([0x42; 20]);
        let err = CustodiaError::SignatureMismatch {
            owner,
            reason: "eoa: recovered someone else".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("signature does not match"));
        assert!(msg.contains(&owner.to_string()));
    }

    #[test]
    fn code_matches_display_prefix() {
        let errors = vec![
            CustodiaError::InvalidSignatureEncoding { v: 5 },
            CustodiaError::RecoveryFailure { reason: "x".into() },
            CustodiaError::SignerMismatch {
                expected: Address::ZERO,
                recovered: Address::repeat_byte(1),
            },
            CustodiaError::UnknownSigner(Address::ZERO),
            CustodiaError::InsufficientSignatures {
                provided: 1,
                threshold: 2,
            },
            CustodiaError::SignerOrderViolation {
                previous: Address::ZERO,
                current: Address::ZERO,
            },
            CustodiaError::UnknownWallet(Address::ZERO),
            CustodiaError::BalanceOverflow,
            CustodiaError::StaleNonce {
                signed: 0,
                current: 1,
            },
            CustodiaError::ReleasePending {
                owner: Address::ZERO,
            },
            CustodiaError::Unauthorized {
                caller: Address::ZERO,
            },
            CustodiaError::AssetTransferFailure { reason: "x".into() },
            CustodiaError::InvalidAsset("x".into()),
            CustodiaError::SupplyInvariantViolation { reason: "x".into() },
            CustodiaError::Internal("x".into()),
            CustodiaError::Serialization("x".into()),
            CustodiaError::Configuration("x".into()),
            CustodiaError::Io("x".into()),
            CustodiaError::Storage("x".into()),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with(err.code()),
                "code {} does not prefix {msg}",
                err.code()
            );
        }
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CustodiaError = io.into();
        assert!(matches!(err, CustodiaError::Io(_)));
    }
}
