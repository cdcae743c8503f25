//! The external asset contracts the engine holds custody through.
//!
//! [`AssetCollaborator`] is the outbound seam: pull on deposit, release on
//! withdrawal. [`MultiTokenReceiver`] is the inbound seam: a multi-token
//! contract that pushed tokens into custody asks the receiver to accept
//! them and reverts the transfer unless the right magic value comes back.
//!
//! A receiver callback is only a claim. Before crediting anything the engine
//! asks the collaborator to confirm, and consume, the arrival it describes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use tracing::debug;

use custodia_types::{
    AccountId, Amount, AssetDescriptor, AssetKey, CustodiaError, Result, constants, short_account,
};

/// Transfer interface of the asset contracts held in custody.
pub trait AssetCollaborator: Send + Sync {
    /// Pull `amount` of `asset` from `from` into custody.
    fn transfer_in(&self, asset: &AssetDescriptor, from: AccountId, amount: Amount) -> Result<()>;

    /// Release `amount` of `asset` from custody to `to`.
    fn transfer_out(&self, asset: &AssetDescriptor, to: AccountId, amount: Amount) -> Result<()>;

    /// Confirm that `from` just pushed every `(asset, amount)` in `arrivals`
    /// into custody, and mark those arrivals as credited. All or nothing.
    ///
    /// Collaborators that never push reject every claim.
    fn confirm_received(&self, from: AccountId, arrivals: &[(AssetKey, Amount)]) -> Result<()> {
        Err(CustodiaError::AssetTransferFailure {
            reason: format!(
                "no pushed arrival from {} ({} claimed)",
                short_account(&from),
                arrivals.len()
            ),
        })
    }
}

/// Receiver side of multi-token safe transfers.
pub trait MultiTokenReceiver {
    /// Accept a single pushed position. Must return [`constants::MULTI_TOKEN_RECEIVED`].
    fn on_multi_token_received(
        &self,
        token_contract: Address,
        operator: Address,
        from: AccountId,
        id: U256,
        value: Amount,
        data: &[u8],
    ) -> Result<[u8; 4]>;

    /// Accept a batch of pushed positions. Must return [`constants::MULTI_TOKEN_BATCH_RECEIVED`].
    fn on_multi_token_batch_received(
        &self,
        token_contract: Address,
        operator: Address,
        from: AccountId,
        ids: &[U256],
        values: &[Amount],
        data: &[u8],
    ) -> Result<[u8; 4]>;
}

/// Any collaborator failure surfaces as `AssetTransferFailure`.
pub(crate) fn transfer_failure(err: CustodiaError) -> CustodiaError {
    match err {
        CustodiaError::AssetTransferFailure { .. } => err,
        other => CustodiaError::AssetTransferFailure {
            reason: other.to_string(),
        },
    }
}

// =================================================================
// InMemoryAssetBank
// =================================================================

/// In-memory token contracts: tracks every holder's external balance,
/// including the custodian's own.
///
/// Pushes made through [`Self::safe_transfer_from`] are recorded as inbound
/// arrivals until the receiver confirms them or the push settles.
/// Transfers can be switched to fail to exercise rollback paths.
#[derive(Debug)]
pub struct InMemoryAssetBank {
    custodian: Address,
    holdings: Mutex<HashMap<(Address, AssetKey), Amount>>,
    inbound: Mutex<HashMap<(Address, AssetKey), Amount>>,
    reject_in: AtomicBool,
    reject_out: AtomicBool,
}

impl InMemoryAssetBank {
    /// A bank whose custody account is `custodian`.
    #[must_use]
    pub fn new(custodian: Address) -> Self {
        Self {
            custodian,
            holdings: Mutex::new(HashMap::new()),
            inbound: Mutex::new(HashMap::new()),
            reject_in: AtomicBool::new(false),
            reject_out: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn custodian(&self) -> Address {
        self.custodian
    }

    /// Create `amount` of `asset` out of thin air for `holder`.
    pub fn mint(&self, holder: Address, asset: &AssetDescriptor, amount: Amount) {
        let mut holdings = self.holdings.lock();
        let entry = holdings.entry((holder, asset.key())).or_insert(Amount::ZERO);
        *entry = entry.saturating_add(amount);
    }

    #[must_use]
    pub fn balance_of(&self, holder: &Address, asset: &AssetKey) -> Amount {
        self.holdings
            .lock()
            .get(&(*holder, *asset))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// What the custodian actually holds of `asset`.
    #[must_use]
    pub fn custody_balance(&self, asset: &AssetKey) -> Amount {
        self.balance_of(&self.custodian, asset)
    }

    pub fn set_reject_transfers_in(&self, reject: bool) {
        self.reject_in.store(reject, Ordering::SeqCst);
    }

    pub fn set_reject_transfers_out(&self, reject: bool) {
        self.reject_out.store(reject, Ordering::SeqCst);
    }

    /// Push a position from `from` into custody and notify `receiver`.
    /// The move is undone unless the receiver returns the single-transfer magic value.
    pub fn safe_transfer_from(
        &self,
        receiver: &dyn MultiTokenReceiver,
        operator: Address,
        from: Address,
        asset: &AssetDescriptor,
        value: Amount,
        data: &[u8],
    ) -> Result<()> {
        let moves = [(asset.key(), value)];
        self.move_balances(from, self.custodian, &moves)?;
        self.record_inbound(from, &moves);
        let accepted = receiver.on_multi_token_received(
            asset.contract,
            operator,
            from,
            asset.token_id,
            value,
            data,
        );
        self.settle_push(accepted, constants::MULTI_TOKEN_RECEIVED, from, &moves)
    }

    /// Batch variant of [`Self::safe_transfer_from`]. All positions share `contract`.
    #[allow(clippy::too_many_arguments)]
    pub fn safe_batch_transfer_from(
        &self,
        receiver: &dyn MultiTokenReceiver,
        operator: Address,
        from: Address,
        contract: Address,
        ids: &[U256],
        values: &[Amount],
        data: &[u8],
    ) -> Result<()> {
        if ids.len() != values.len() {
            return Err(CustodiaError::AssetTransferFailure {
                reason: format!("{} ids but {} values", ids.len(), values.len()),
            });
        }
        let moves: Vec<(AssetKey, Amount)> = ids
            .iter()
            .zip(values)
            .map(|(id, value)| (AssetKey::new(contract, *id), *value))
            .collect();
        self.move_balances(from, self.custodian, &moves)?;
        self.record_inbound(from, &moves);
        let accepted =
            receiver.on_multi_token_batch_received(contract, operator, from, ids, values, data);
        self.settle_push(accepted, constants::MULTI_TOKEN_BATCH_RECEIVED, from, &moves)
    }

    fn settle_push(
        &self,
        accepted: Result<[u8; 4]>,
        expected: [u8; 4],
        from: Address,
        moves: &[(AssetKey, Amount)],
    ) -> Result<()> {
        self.clear_inbound(from, moves);
        let reason = match accepted {
            Ok(magic) if magic == expected => return Ok(()),
            Ok(magic) => format!("receiver returned 0x{}", alloy_primitives::hex::encode(magic)),
            Err(err) => err.to_string(),
        };
        // Revert the push.
        self.move_balances(self.custodian, from, moves)?;
        Err(CustodiaError::AssetTransferFailure { reason })
    }

    fn record_inbound(&self, from: Address, moves: &[(AssetKey, Amount)]) {
        let mut inbound = self.inbound.lock();
        for (asset, amount) in moves {
            let entry = inbound.entry((from, *asset)).or_insert(Amount::ZERO);
            *entry = entry.saturating_add(*amount);
        }
    }

    /// Drop whatever part of a push the receiver did not confirm.
    fn clear_inbound(&self, from: Address, moves: &[(AssetKey, Amount)]) {
        let mut inbound = self.inbound.lock();
        for (asset, amount) in moves {
            if let Some(entry) = inbound.get_mut(&(from, *asset)) {
                *entry = entry.saturating_sub(*amount);
                if entry.is_zero() {
                    inbound.remove(&(from, *asset));
                }
            }
        }
    }

    /// Move every `(asset, amount)` from `from` to `to`, all or nothing.
    fn move_balances(&self, from: Address, to: Address, moves: &[(AssetKey, Amount)]) -> Result<()> {
        let mut holdings = self.holdings.lock();
        let mut needed: HashMap<AssetKey, Amount> = HashMap::new();
        for (asset, amount) in moves {
            let total = needed.entry(*asset).or_insert(Amount::ZERO);
            *total = total.saturating_add(*amount);
        }
        for (asset, total) in &needed {
            let available = holdings.get(&(from, *asset)).copied().unwrap_or(Amount::ZERO);
            if available < *total {
                return Err(CustodiaError::AssetTransferFailure {
                    reason: format!(
                        "{} holds {available} of {asset}, needs {total}",
                        short_account(&from)
                    ),
                });
            }
        }
        for (asset, total) in needed {
            if let Some(src) = holdings.get_mut(&(from, asset)) {
                *src -= total;
            }
            let dst = holdings.entry((to, asset)).or_insert(Amount::ZERO);
            *dst = dst.saturating_add(total);
        }
        Ok(())
    }
}

impl AssetCollaborator for InMemoryAssetBank {
    fn transfer_in(&self, asset: &AssetDescriptor, from: AccountId, amount: Amount) -> Result<()> {
        if self.reject_in.load(Ordering::SeqCst) {
            return Err(CustodiaError::AssetTransferFailure {
                reason: format!("{asset} rejected inbound transfer"),
            });
        }
        self.move_balances(from, self.custodian, &[(asset.key(), amount)])?;
        debug!(from = %short_account(&from), asset = %asset, amount = %amount, "Pulled into custody");
        Ok(())
    }

    fn transfer_out(&self, asset: &AssetDescriptor, to: AccountId, amount: Amount) -> Result<()> {
        if self.reject_out.load(Ordering::SeqCst) {
            return Err(CustodiaError::AssetTransferFailure {
                reason: format!("{asset} rejected outbound transfer"),
            });
        }
        self.move_balances(self.custodian, to, &[(asset.key(), amount)])?;
        debug!(to = %short_account(&to), asset = %asset, amount = %amount, "Released from custody");
        Ok(())
    }

    fn confirm_received(&self, from: AccountId, arrivals: &[(AssetKey, Amount)]) -> Result<()> {
        let mut inbound = self.inbound.lock();
        let mut claimed: HashMap<AssetKey, Amount> = HashMap::new();
        for (asset, amount) in arrivals {
            let total = claimed.entry(*asset).or_insert(Amount::ZERO);
            *total = total
                .checked_add(*amount)
                .ok_or(CustodiaError::BalanceOverflow)?;
        }
        for (asset, total) in &claimed {
            let arrived = inbound.get(&(from, *asset)).copied().unwrap_or(Amount::ZERO);
            if arrived < *total {
                return Err(CustodiaError::AssetTransferFailure {
                    reason: format!(
                        "{} claims {total} of {asset} arrived, bank saw {arrived}",
                        short_account(&from)
                    ),
                });
            }
        }
        for (asset, total) in claimed {
            if let Some(entry) = inbound.get_mut(&(from, asset)) {
                *entry -= total;
            }
        }
        inbound.retain(|_, amount| !amount.is_zero());
        Ok(())
    }
}
