//! Supply conservation invariant checker.
//!
//! Invariant enforced after every committed transaction:
//! ```text
//! ∀ asset: Σ balances == Σ deposited - Σ withdrawn
//! ```
//!
//! A violation means the ledger has diverged from the assets actually held
//! in custody, and the engine refuses to continue.

use std::collections::{BTreeSet, HashMap};

use custodia_types::{Amount, AssetKey, CustodiaError, Result};

/// Per-asset running totals since genesis.
#[derive(Debug, Default, Clone)]
pub struct SupplyConservation {
    deposited: HashMap<AssetKey, Amount>,
    withdrawn: HashMap<AssetKey, Amount>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_deposit(&mut self, asset: &AssetKey, amount: Amount) -> Result<()> {
        add(&mut self.deposited, asset, amount)
    }

    pub fn record_withdrawal(&mut self, asset: &AssetKey, amount: Amount) -> Result<()> {
        add(&mut self.withdrawn, asset, amount)
    }

    /// Take back a withdrawal whose assets never left custody.
    pub fn reverse_withdrawal(&mut self, asset: &AssetKey, amount: Amount) -> Result<()> {
        let current = self.total_withdrawn(asset);
        let reduced = current
            .checked_sub(amount)
            .ok_or_else(|| CustodiaError::SupplyInvariantViolation {
                reason: format!("asset {asset}: reversing {amount} of {current} withdrawn"),
            })?;
        self.withdrawn.insert(*asset, reduced);
        Ok(())
    }

    #[must_use]
    pub fn total_deposited(&self, asset: &AssetKey) -> Amount {
        self.deposited.get(asset).copied().unwrap_or(Amount::ZERO)
    }

    #[must_use]
    pub fn total_withdrawn(&self, asset: &AssetKey) -> Amount {
        self.withdrawn.get(asset).copied().unwrap_or(Amount::ZERO)
    }

    /// `deposited - withdrawn`, or `None` if more was withdrawn than deposited.
    #[must_use]
    pub fn expected_supply(&self, asset: &AssetKey) -> Option<Amount> {
        self.total_deposited(asset)
            .checked_sub(self.total_withdrawn(asset))
    }

    /// # Errors
    /// Returns [`CustodiaError::SupplyInvariantViolation`] if `actual_supply`
    /// differs from deposits minus withdrawals.
    pub fn verify(&self, asset: &AssetKey, actual_supply: Amount) -> Result<()> {
        match self.expected_supply(asset) {
            Some(expected) if expected == actual_supply => Ok(()),
            expected => Err(CustodiaError::SupplyInvariantViolation {
                reason: format!(
                    "asset {asset}: actual supply {actual_supply} != expected {} \
                     (deposited={}, withdrawn={})",
                    expected.map_or_else(|| "negative".to_string(), |e| e.to_string()),
                    self.total_deposited(asset),
                    self.total_withdrawn(asset),
                ),
            }),
        }
    }

    /// Every asset with a deposit or withdrawal on record, sorted.
    #[must_use]
    pub fn tracked_assets(&self) -> Vec<AssetKey> {
        let assets: BTreeSet<AssetKey> = self
            .deposited
            .keys()
            .chain(self.withdrawn.keys())
            .copied()
            .collect();
        assets.into_iter().collect()
    }

    pub fn deposits(&self) -> impl Iterator<Item = (AssetKey, Amount)> + '_ {
        self.deposited.iter().map(|(k, v)| (*k, *v))
    }

    pub fn withdrawals(&self) -> impl Iterator<Item = (AssetKey, Amount)> + '_ {
        self.withdrawn.iter().map(|(k, v)| (*k, *v))
    }

    pub(crate) fn restore(
        deposited: impl IntoIterator<Item = (AssetKey, Amount)>,
        withdrawn: impl IntoIterator<Item = (AssetKey, Amount)>,
    ) -> Self {
        Self {
            deposited: deposited.into_iter().collect(),
            withdrawn: withdrawn.into_iter().collect(),
        }
    }
}

fn add(totals: &mut HashMap<AssetKey, Amount>, asset: &AssetKey, amount: Amount) -> Result<()> {
    let entry = totals.entry(*asset).or_insert(Amount::ZERO);
    *entry = entry
        .checked_add(amount)
        .ok_or(CustodiaError::BalanceOverflow)?;
    Ok(())
}
