//! Identifiers used throughout Custodia.
//!
//! Accounts are raw 20-byte EVM addresses; there is no flag telling an
//! externally-owned account apart from a contract wallet. Receipt IDs use
//! UUIDv7 for time-ordered lexicographic sorting.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use alloy_primitives::{Address, B256, U256};

/// An account: either an EOA or a contract wallet, keyed identically.
pub type AccountId = Address;

/// Token amount in base units. Never negative; arithmetic is checked.
pub type Amount = U256;

/// Short hex rendering of an account for log lines (`0x1234…abcd`).
#[must_use]
pub fn short_account(account: &AccountId) -> String {
    let bytes = account.as_slice();
    format!(
        "0x{}…{}",
        hex::encode(&bytes[..2]),
        hex::encode(&bytes[bytes.len() - 2..])
    )
}

// ---------------------------------------------------------------------------
// ReceiptId
// ---------------------------------------------------------------------------

/// Globally unique receipt identifier. Uses UUIDv7 for time-ordered sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ReceiptId(pub Uuid);

impl ReceiptId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Extract the embedded timestamp (milliseconds since UNIX epoch) from UUIDv7.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        let bytes = self.0.as_bytes();
        u64::from_be_bytes([
            0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
        ])
    }
}

impl Default for ReceiptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rcpt:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_id_uniqueness_and_ordering() {
        let a = ReceiptId::new();
        let b = ReceiptId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn receipt_id_timestamp_extraction() {
        let before = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let id = ReceiptId::new();
        let after = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let ts = id.timestamp_ms();
        assert!(ts >= before && ts <= after, "ts={ts}, before={before}, after={after}");
    }

    #[test]
    fn short_account_keeps_both_ends() {
        let account = Address::from([0xab; 20]);
        assert_eq!(short_account(&account), "0xabab…abab");
    }

    #[test]
    fn receipt_id_display_prefix() {
        assert!(ReceiptId::new().to_string().starts_with("rcpt:"));
    }
}
