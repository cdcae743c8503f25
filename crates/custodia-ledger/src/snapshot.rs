//! Durable image of the ledger state.
//!
//! Three logical tables, balances, nonces and in-flight releases, plus the
//! supply totals needed to re-check conservation after a restart. Rows are sorted so that the
//! same state always serializes to the same bytes, and a SHA-256 checksum
//! over the body detects torn or tampered files.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use alloy_primitives::Address;
use custodia_types::{AccountId, Amount, CustodiaError, Result, U256, constants};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceRow {
    pub owner: AccountId,
    pub contract: Address,
    pub token_id: U256,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NonceRow {
    pub owner: AccountId,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SupplyRow {
    pub contract: Address,
    pub token_id: U256,
    pub amount: Amount,
}

/// A release reserved in the ledger whose asset transfer has not settled.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PendingRow {
    pub owner: AccountId,
    pub contract: Address,
    pub token_id: U256,
    pub amount: Amount,
    /// The nonce the release consumed.
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub balances: Vec<BalanceRow>,
    pub nonces: Vec<NonceRow>,
    pub deposited: Vec<SupplyRow>,
    pub withdrawn: Vec<SupplyRow>,
    pub pending: Vec<PendingRow>,
    /// Hex SHA-256 over the JSON encoding of every other field.
    pub checksum: String,
}

#[derive(Serialize)]
struct SnapshotBody<'a> {
    version: u32,
    balances: &'a [BalanceRow],
    nonces: &'a [NonceRow],
    deposited: &'a [SupplyRow],
    withdrawn: &'a [SupplyRow],
    pending: &'a [PendingRow],
}

impl LedgerSnapshot {
    /// Sort the rows and compute the checksum.
    pub fn seal(
        mut balances: Vec<BalanceRow>,
        mut nonces: Vec<NonceRow>,
        mut deposited: Vec<SupplyRow>,
        mut withdrawn: Vec<SupplyRow>,
        mut pending: Vec<PendingRow>,
    ) -> Result<Self> {
        balances.sort();
        nonces.sort();
        deposited.sort();
        withdrawn.sort();
        pending.sort();
        let mut snapshot = Self {
            version: constants::SNAPSHOT_VERSION,
            balances,
            nonces,
            deposited,
            withdrawn,
            pending,
            checksum: String::new(),
        };
        snapshot.checksum = snapshot.compute_checksum()?;
        Ok(snapshot)
    }

    pub fn compute_checksum(&self) -> Result<String> {
        let body = serde_json::to_vec(&SnapshotBody {
            version: self.version,
            balances: &self.balances,
            nonces: &self.nonces,
            deposited: &self.deposited,
            withdrawn: &self.withdrawn,
            pending: &self.pending,
        })?;
        Ok(hex::encode(Sha256::digest(&body)))
    }

    /// # Errors
    /// `Storage` on unknown version or checksum mismatch.
    pub fn verify(&self) -> Result<()> {
        if self.version != constants::SNAPSHOT_VERSION {
            return Err(CustodiaError::Storage(format!(
                "unsupported snapshot version {}",
                self.version
            )));
        }
        let expected = self.compute_checksum()?;
        if expected != self.checksum {
            return Err(CustodiaError::Storage(format!(
                "snapshot checksum mismatch: stored {}, computed {expected}",
                self.checksum
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse and verify. Undecodable input is a `Storage` error.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let snapshot: Self = serde_json::from_slice(bytes)
            .map_err(|e| CustodiaError::Storage(format!("undecodable snapshot: {e}")))?;
        snapshot.verify()?;
        Ok(snapshot)
    }
}
