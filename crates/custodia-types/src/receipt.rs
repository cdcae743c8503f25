//! Receipt types for the Custodia audit trail.
//!
//! Every committed deposit and withdrawal produces a [`Receipt`] whose
//! `payload_hash` commits to the ledger effect, so receipts can be checked
//! independently of the engine that issued them.

use alloy_primitives::B256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{AccountId, Amount, AssetDescriptor, ReceiptId};

/// The kind of ledger effect this receipt proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiptKind {
    /// Assets entered custody and the owner was credited.
    Deposit,
    /// An authorized withdrawal debited the owner and released the assets.
    Withdrawal,
}

impl ReceiptKind {
    fn tag(self) -> u8 {
        match self {
            Self::Deposit => 0,
            Self::Withdrawal => 1,
        }
    }
}

impl std::fmt::Display for ReceiptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deposit => write!(f, "DEPOSIT"),
            Self::Withdrawal => write!(f, "WITHDRAWAL"),
        }
    }
}

/// Proof that a ledger transition was committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub kind: ReceiptKind,
    /// Account whose balance changed.
    pub owner: AccountId,
    pub asset: AssetDescriptor,
    pub amount: Amount,
    /// The nonce consumed by a withdrawal.
    pub nonce: Option<u64>,
    /// Typed-data digest the owner authorized, for withdrawals.
    pub authorization_digest: Option<B256>,
    /// SHA-256 over [`Receipt::canonical_payload`].
    pub payload_hash: [u8; 32],
    pub issued_at: DateTime<Utc>,
}

impl Receipt {
    /// Receipt for a credited deposit.
    #[must_use]
    pub fn deposit(owner: AccountId, asset: AssetDescriptor, amount: Amount) -> Self {
        Self::issue(ReceiptKind::Deposit, owner, asset, amount, None, None)
    }

    /// Receipt for a released withdrawal.
    #[must_use]
    pub fn withdrawal(
        owner: AccountId,
        asset: AssetDescriptor,
        amount: Amount,
        nonce: u64,
        authorization_digest: B256,
    ) -> Self {
        Self::issue(
            ReceiptKind::Withdrawal,
            owner,
            asset,
            amount,
            Some(nonce),
            Some(authorization_digest),
        )
    }

    fn issue(
        kind: ReceiptKind,
        owner: AccountId,
        asset: AssetDescriptor,
        amount: Amount,
        nonce: Option<u64>,
        authorization_digest: Option<B256>,
    ) -> Self {
        let mut receipt = Self {
            id: ReceiptId::new(),
            kind,
            owner,
            asset,
            amount,
            nonce,
            authorization_digest,
            payload_hash: [0u8; 32],
            issued_at: Utc::now(),
        };
        receipt.payload_hash = receipt.compute_payload_hash();
        receipt
    }

    /// Canonical bytes committed to by the payload hash.
    ///
    /// Format: `"custodia:receipt:v1:" || kind || owner || contract || token_id || amount || [nonce] || [digest]`
    #[must_use]
    pub fn canonical_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(192);
        payload.extend_from_slice(b"custodia:receipt:v1:");
        payload.push(self.kind.tag());
        payload.extend_from_slice(self.owner.as_slice());
        payload.extend_from_slice(self.asset.contract.as_slice());
        payload.extend_from_slice(&self.asset.token_id.to_be_bytes::<32>());
        payload.extend_from_slice(&self.amount.to_be_bytes::<32>());
        if let Some(nonce) = self.nonce {
            payload.extend_from_slice(&nonce.to_be_bytes());
        }
        if let Some(digest) = self.authorization_digest {
            payload.extend_from_slice(digest.as_slice());
        }
        payload
    }

    fn compute_payload_hash(&self) -> [u8; 32] {
        let digest = Sha256::digest(self.canonical_payload());
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }

    /// Whether `payload_hash` still matches the receipt contents.
    #[must_use]
    pub fn verify_payload_hash(&self) -> bool {
        self.compute_payload_hash() == self.payload_hash
    }

    /// Hex rendering of the payload hash.
    #[must_use]
    pub fn payload_hash_hex(&self) -> String {
        hex::encode(self.payload_hash)
    }
}
