//! Per-owner replay-protection counters.
//!
//! A nonce starts at zero, moves only through [`NonceStore::consume`], and
//! never goes backwards. A signature bound to nonce `N` is usable only while
//! the stored nonce is `N`.

use std::collections::HashMap;

use custodia_types::{AccountId, CustodiaError, Result};

#[derive(Debug, Default, Clone)]
pub struct NonceStore {
    nonces: HashMap<AccountId, u64>,
}

impl NonceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The nonce the next authorization from `owner` must be signed for.
    #[must_use]
    pub fn current(&self, owner: &AccountId) -> u64 {
        self.nonces.get(owner).copied().unwrap_or(0)
    }

    /// Fail unless `owner`'s nonce is still `expected`.
    pub fn check(&self, owner: &AccountId, expected: u64) -> Result<()> {
        let current = self.current(owner);
        if current != expected {
            return Err(CustodiaError::StaleNonce {
                signed: expected,
                current,
            });
        }
        Ok(())
    }

    /// Compare-and-increment. Returns the new nonce.
    ///
    /// # Errors
    /// `StaleNonce` if the stored nonce is not `expected`.
    pub fn consume(&mut self, owner: &AccountId, expected: u64) -> Result<u64> {
        self.check(owner, expected)?;
        let next = expected
            .checked_add(1)
            .ok_or_else(|| CustodiaError::Internal("nonce space exhausted".into()))?;
        self.nonces.insert(*owner, next);
        Ok(next)
    }

    pub(crate) fn set(&mut self, owner: AccountId, nonce: u64) {
        self.nonces.insert(owner, nonce);
    }

    pub fn entries(&self) -> impl Iterator<Item = (AccountId, u64)> + '_ {
        self.nonces.iter().map(|(owner, nonce)| (*owner, *nonce))
    }
}
