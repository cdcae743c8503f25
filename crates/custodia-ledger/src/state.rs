//! Transactional ledger state.
//!
//! [`LedgerState`] groups the balance ledger, the nonce store, and supply
//! accounting so that a deposit or a withdrawal touches all of them as one
//! unit. Every transition validates first and mutates only once nothing can
//! fail, so a rejected call leaves no trace.
//!
//! A withdrawal is split around the external transfer:
//!
//! ```text
//! reserve_withdrawal  debit + nonce++ + withdrawn, release recorded as pending
//! finalize_release    transfer confirmed, pending record dropped
//! cancel_release      transfer failed, debit + nonce + withdrawn undone
//! ```
//!
//! While a release is pending its owner cannot start another one.

use std::collections::BTreeMap;

use tracing::debug;

use custodia_types::{AccountId, Amount, AssetKey, CustodiaError, Result, short_account};

use crate::ledger::Ledger;
use crate::nonce_store::NonceStore;
use crate::snapshot::{BalanceRow, LedgerSnapshot, NonceRow, PendingRow, SupplyRow};
use crate::supply_conservation::SupplyConservation;

/// A withdrawal reserved in the ledger whose asset transfer has not settled.
///
/// The balance is already debited and the nonce consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRelease {
    pub owner: AccountId,
    pub asset: AssetKey,
    pub amount: Amount,
    /// The nonce the authorization was signed for.
    pub nonce: u64,
}

#[derive(Debug, Default, Clone)]
pub struct LedgerState {
    ledger: Ledger,
    nonces: NonceStore,
    supply: SupplyConservation,
    pending: BTreeMap<AccountId, PendingRelease>,
}

impl LedgerState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn balance_of(&self, owner: &AccountId, asset: &AssetKey) -> Amount {
        self.ledger.balance_of(owner, asset)
    }

    #[must_use]
    pub fn nonce_of(&self, owner: &AccountId) -> u64 {
        self.nonces.current(owner)
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    #[must_use]
    pub fn nonces(&self) -> &NonceStore {
        &self.nonces
    }

    #[must_use]
    pub fn supply(&self) -> &SupplyConservation {
        &self.supply
    }

    #[must_use]
    pub fn pending_release(&self, owner: &AccountId) -> Option<&PendingRelease> {
        self.pending.get(owner)
    }

    pub fn pending_releases(&self) -> impl Iterator<Item = &PendingRelease> + '_ {
        self.pending.values()
    }

    // =================================================================
    // Deposits
    // =================================================================

    /// Credit one deposit. Returns the owner's new balance.
    pub fn apply_deposit(&mut self, owner: &AccountId, asset: &AssetKey, amount: Amount) -> Result<Amount> {
        self.apply_deposits(owner, &[(*asset, amount)])?;
        Ok(self.ledger.balance_of(owner, asset))
    }

    /// Would [`Self::apply_deposits`] succeed right now?
    pub fn check_deposits(&self, owner: &AccountId, credits: &[(AssetKey, Amount)]) -> Result<()> {
        self.deposit_totals(owner, credits).map(|_| ())
    }

    /// Credit several deposits to one owner, all or nothing.
    pub fn apply_deposits(&mut self, owner: &AccountId, credits: &[(AssetKey, Amount)]) -> Result<()> {
        let totals = self.deposit_totals(owner, credits)?;
        for (asset, total) in &totals {
            self.ledger.credit(owner, asset, *total)?;
            self.supply.record_deposit(asset, *total)?;
        }
        debug!(
            owner = %short_account(owner),
            assets = totals.len(),
            "Deposit applied"
        );
        Ok(())
    }

    /// Per-asset sums of `credits`, validated against overflow.
    fn deposit_totals(
        &self,
        owner: &AccountId,
        credits: &[(AssetKey, Amount)],
    ) -> Result<BTreeMap<AssetKey, Amount>> {
        let mut totals: BTreeMap<AssetKey, Amount> = BTreeMap::new();
        for (asset, amount) in credits {
            let total = totals.entry(*asset).or_insert(Amount::ZERO);
            *total = total.checked_add(*amount).ok_or(CustodiaError::BalanceOverflow)?;
        }
        for (asset, total) in &totals {
            self.supply
                .total_deposited(asset)
                .checked_add(*total)
                .ok_or(CustodiaError::BalanceOverflow)?;
            self.ledger
                .balance_of(owner, asset)
                .checked_add(*total)
                .ok_or(CustodiaError::BalanceOverflow)?;
        }
        Ok(totals)
    }

    // =================================================================
    // Withdrawals
    // =================================================================

    /// Would [`Self::reserve_withdrawal`] succeed right now?
    ///
    /// Nonce first, then any in-flight release, then balance.
    pub fn check_withdrawal(
        &self,
        owner: &AccountId,
        asset: &AssetKey,
        amount: Amount,
        expected_nonce: u64,
    ) -> Result<()> {
        self.nonces.check(owner, expected_nonce)?;
        if self.pending.contains_key(owner) {
            return Err(CustodiaError::ReleasePending { owner: *owner });
        }
        let available = self.ledger.balance_of(owner, asset);
        if available < amount {
            return Err(CustodiaError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        Ok(())
    }

    /// Debit, consume the nonce, and record the outflow, leaving the
    /// release pending until the transfer settles.
    pub fn reserve_withdrawal(
        &mut self,
        owner: &AccountId,
        asset: &AssetKey,
        amount: Amount,
        expected_nonce: u64,
    ) -> Result<PendingRelease> {
        self.check_withdrawal(owner, asset, amount, expected_nonce)?;
        self.supply
            .total_withdrawn(asset)
            .checked_add(amount)
            .ok_or(CustodiaError::BalanceOverflow)?;

        self.ledger.debit(owner, asset, amount)?;
        let next = self.nonces.consume(owner, expected_nonce)?;
        self.supply.record_withdrawal(asset, amount)?;
        let release = PendingRelease {
            owner: *owner,
            asset: *asset,
            amount,
            nonce: expected_nonce,
        };
        self.pending.insert(*owner, release);
        debug!(
            owner = %short_account(owner),
            asset = %asset,
            nonce = next,
            "Release reserved"
        );
        Ok(release)
    }

    /// The transfer went through: the reservation becomes final.
    pub fn finalize_release(&mut self, owner: &AccountId) -> Result<PendingRelease> {
        self.pending
            .remove(owner)
            .ok_or_else(|| no_pending_release(owner))
    }

    /// The transfer did not happen: restore balance, nonce and supply.
    pub fn cancel_release(&mut self, owner: &AccountId) -> Result<PendingRelease> {
        let release = *self
            .pending
            .get(owner)
            .ok_or_else(|| no_pending_release(owner))?;
        self.ledger
            .balance_of(owner, &release.asset)
            .checked_add(release.amount)
            .ok_or(CustodiaError::BalanceOverflow)?;
        self.supply.reverse_withdrawal(&release.asset, release.amount)?;
        self.ledger.credit(owner, &release.asset, release.amount)?;
        self.nonces.set(*owner, release.nonce);
        self.pending.remove(owner);
        debug!(
            owner = %short_account(owner),
            asset = %release.asset,
            nonce = release.nonce,
            "Release cancelled"
        );
        Ok(release)
    }

    /// Reserve and finalize in one step. Returns the owner's new nonce.
    pub fn commit_withdrawal(
        &mut self,
        owner: &AccountId,
        asset: &AssetKey,
        amount: Amount,
        expected_nonce: u64,
    ) -> Result<u64> {
        self.reserve_withdrawal(owner, asset, amount, expected_nonce)?;
        self.finalize_release(owner)?;
        Ok(self.nonces.current(owner))
    }

    // =================================================================
    // Invariants
    // =================================================================

    /// Check conservation for one asset.
    pub fn verify_supply(&self, asset: &AssetKey) -> Result<()> {
        self.supply.verify(asset, self.ledger.total_supply(asset)?)
    }

    /// Check conservation for every asset the state knows about.
    pub fn verify_all(&self) -> Result<()> {
        let mut assets = self.supply.tracked_assets();
        assets.extend(self.ledger.assets());
        assets.sort();
        assets.dedup();
        for asset in &assets {
            self.verify_supply(asset)?;
        }
        Ok(())
    }

    // =================================================================
    // Persistence
    // =================================================================

    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        let balances = self
            .ledger
            .entries()
            .map(|(owner, key, amount)| BalanceRow {
                owner,
                contract: key.contract,
                token_id: key.token_id,
                amount,
            })
            .collect();
        let nonces = self
            .nonces
            .entries()
            .map(|(owner, nonce)| NonceRow { owner, nonce })
            .collect();
        let supply_row = |(key, amount): (AssetKey, Amount)| SupplyRow {
            contract: key.contract,
            token_id: key.token_id,
            amount,
        };
        let pending = self
            .pending
            .values()
            .map(|release| PendingRow {
                owner: release.owner,
                contract: release.asset.contract,
                token_id: release.asset.token_id,
                amount: release.amount,
                nonce: release.nonce,
            })
            .collect();
        LedgerSnapshot::seal(
            balances,
            nonces,
            self.supply.deposits().map(supply_row).collect(),
            self.supply.withdrawals().map(supply_row).collect(),
            pending,
        )
    }

    /// Rebuild from a verified snapshot and re-check conservation.
    pub fn from_snapshot(snapshot: &LedgerSnapshot) -> Result<Self> {
        snapshot.verify()?;
        let mut state = Self::new();
        for row in &snapshot.balances {
            state
                .ledger
                .set(row.owner, AssetKey::new(row.contract, row.token_id), row.amount);
        }
        for row in &snapshot.nonces {
            state.nonces.set(row.owner, row.nonce);
        }
        let to_entry = |row: &SupplyRow| (AssetKey::new(row.contract, row.token_id), row.amount);
        state.supply = SupplyConservation::restore(
            snapshot.deposited.iter().map(to_entry),
            snapshot.withdrawn.iter().map(to_entry),
        );
        for row in &snapshot.pending {
            if state.nonces.current(&row.owner) != row.nonce.saturating_add(1) {
                return Err(CustodiaError::Storage(format!(
                    "pending release of {} at nonce {} does not match stored nonce",
                    short_account(&row.owner),
                    row.nonce
                )));
            }
            state.pending.insert(
                row.owner,
                PendingRelease {
                    owner: row.owner,
                    asset: AssetKey::new(row.contract, row.token_id),
                    amount: row.amount,
                    nonce: row.nonce,
                },
            );
        }
        state.verify_all()?;
        Ok(state)
    }
}

fn no_pending_release(owner: &AccountId) -> CustodiaError {
    CustodiaError::Internal(format!("no pending release for {}", short_account(owner)))
}
