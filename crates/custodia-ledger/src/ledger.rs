//! Balance ledger keyed by `(owner, asset contract, token id)`.
//!
//! Balances are created implicitly at zero and never removed; a zero
//! balance is a valid state. All arithmetic is checked.

use std::collections::HashMap;

use custodia_types::{AccountId, Amount, AssetKey, CustodiaError, Result};

/// In-memory balances for every owner and asset held in custody.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    /// `(owner, asset) → balance`
    balances: HashMap<(AccountId, AssetKey), Amount>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `owner` in `asset`; zero if never credited.
    #[must_use]
    pub fn balance_of(&self, owner: &AccountId, asset: &AssetKey) -> Amount {
        self.balances
            .get(&(*owner, *asset))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    // =================================================================
    // Core operations
    // =================================================================

    /// Add `amount` to `owner`'s balance. Returns the new balance.
    ///
    /// # Errors
    /// Returns `BalanceOverflow` if the balance would exceed 2^256 - 1; the
    /// balance is left unchanged.
    pub fn credit(&mut self, owner: &AccountId, asset: &AssetKey, amount: Amount) -> Result<Amount> {
        let next = self
            .balance_of(owner, asset)
            .checked_add(amount)
            .ok_or(CustodiaError::BalanceOverflow)?;
        self.balances.insert((*owner, *asset), next);
        Ok(next)
    }

    /// Subtract `amount` from `owner`'s balance. Returns the new balance.
    ///
    /// # Errors
    /// Returns `InsufficientBalance` if the balance is below `amount`; the
    /// balance is left unchanged.
    pub fn debit(&mut self, owner: &AccountId, asset: &AssetKey, amount: Amount) -> Result<Amount> {
        let available = self.balance_of(owner, asset);
        let next = available
            .checked_sub(amount)
            .ok_or(CustodiaError::InsufficientBalance {
                needed: amount,
                available,
            })?;
        self.balances.insert((*owner, *asset), next);
        Ok(next)
    }

    /// Overwrite a balance. Used when restoring from a snapshot.
    pub(crate) fn set(&mut self, owner: AccountId, asset: AssetKey, amount: Amount) {
        self.balances.insert((owner, asset), amount);
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Sum of all owners' balances in `asset`.
    ///
    /// # Errors
    /// Returns `BalanceOverflow` if the sum does not fit in 256 bits, which
    /// can only happen if the conservation invariant is already broken.
    pub fn total_supply(&self, asset: &AssetKey) -> Result<Amount> {
        self.balances
            .iter()
            .filter(|((_, key), _)| key == asset)
            .try_fold(Amount::ZERO, |acc, (_, amount)| {
                acc.checked_add(*amount).ok_or(CustodiaError::BalanceOverflow)
            })
    }

    /// Every `(owner, asset, balance)` entry, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (AccountId, AssetKey, Amount)> + '_ {
        self.balances
            .iter()
            .map(|((owner, asset), amount)| (*owner, *asset, *amount))
    }

    /// Distinct assets that have ever been credited.
    #[must_use]
    pub fn assets(&self) -> Vec<AssetKey> {
        let mut assets: Vec<AssetKey> = self.balances.keys().map(|(_, key)| *key).collect();
        assets.sort();
        assets.dedup();
        assets
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_types::{Address, U256};

    fn alice() -> AccountId {
        Address::repeat_byte(0xa1)
    }

    fn bob() -> AccountId {
        Address::repeat_byte(0xb0)
    }

    fn usdc() -> AssetKey {
        AssetKey::fungible(Address::repeat_byte(0x11))
    }

    #[test]
    fn unseen_balance_is_zero() {
        let ledger = Ledger::new();
        assert_eq!(ledger.balance_of(&alice(), &usdc()), U256::ZERO);
        assert!(ledger.is_empty());
    }

    #[test]
    fn credit_then_debit() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.credit(&alice(), &usdc(), U256::from(100)).unwrap(), U256::from(100));
        assert_eq!(ledger.debit(&alice(), &usdc(), U256::from(40)).unwrap(), U256::from(60));
        assert_eq!(ledger.balance_of(&alice(), &usdc()), U256::from(60));
    }

    #[test]
    fn debit_to_zero_keeps_entry() {
        let mut ledger = Ledger::new();
        ledger.credit(&alice(), &usdc(), U256::from(5)).unwrap();
        ledger.debit(&alice(), &usdc(), U256::from(5)).unwrap();
        assert_eq!(ledger.balance_of(&alice(), &usdc()), U256::ZERO);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn overdraft_rejected_without_change() {
        let mut ledger = Ledger::new();
        ledger.credit(&alice(), &usdc(), U256::from(10)).unwrap();
        let err = ledger.debit(&alice(), &usdc(), U256::from(11)).unwrap_err();
        assert!(matches!(
            err,
            CustodiaError::InsufficientBalance { needed, available }
                if needed == U256::from(11) && available == U256::from(10)
        ));
        assert_eq!(ledger.balance_of(&alice(), &usdc()), U256::from(10));
    }

    #[test]
    fn overflow_rejected_without_change() {
        let mut ledger = Ledger::new();
        ledger.credit(&alice(), &usdc(), U256::MAX).unwrap();
        let err = ledger.credit(&alice(), &usdc(), U256::from(1)).unwrap_err();
        assert!(matches!(err, CustodiaError::BalanceOverflow));
        assert_eq!(ledger.balance_of(&alice(), &usdc()), U256::MAX);
    }

    #[test]
    fn token_ids_are_separate_balances() {
        let mut ledger = Ledger::new();
        let contract = Address::repeat_byte(0x22);
        let yes = AssetKey::new(contract, U256::from(1));
        let no = AssetKey::new(contract, U256::from(2));
        ledger.credit(&alice(), &yes, U256::from(3)).unwrap();
        assert_eq!(ledger.balance_of(&alice(), &no), U256::ZERO);
        assert!(ledger.debit(&alice(), &no, U256::from(1)).is_err());
    }

    #[test]
    fn total_supply_sums_owners() {
        let mut ledger = Ledger::new();
        let other = AssetKey::fungible(Address::repeat_byte(0x99));
        ledger.credit(&alice(), &usdc(), U256::from(7)).unwrap();
        ledger.credit(&bob(), &usdc(), U256::from(8)).unwrap();
        ledger.credit(&bob(), &other, U256::from(100)).unwrap();
        assert_eq!(ledger.total_supply(&usdc()).unwrap(), U256::from(15));
        assert_eq!(ledger.assets().len(), 2);
        assert_eq!(ledger.entries().count(), 3);
    }
}
