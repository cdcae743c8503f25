//! The settlement engine.
//!
//! One [`SettlementEngine`] owns one ledger. A withdrawal is written ahead
//! before any asset moves, and no collaborator call runs under the state
//! lock:
//!
//! ```text
//! withdraw_collateral(caller, asset, amount, sig, owner)
//!   1. caller == operator                    else Unauthorized
//!   2. nonce = nonces[owner]; verify(sig)    (outside the lock)
//!   3. lock: nonce, no pending release, balance
//!            debit + nonce++ + pending record, persist
//!                                            else error, nothing reserved
//!   4. unlock; assets.transfer_out
//!   5. lock: ok   -> finalize, persist
//!            fail -> cancel (credit back, nonce restored), persist,
//!                    AssetTransferFailure
//! ```
//!
//! Signature recovery is CPU-bound and runs before the lock is taken. The
//! nonce re-check under the lock means two submissions of the same
//! authorization can both verify, but only one can reserve. Once assets
//! have left custody the call reports success even if the final write
//! fails; the stored image then still holds the pending record, which an
//! operator settles with [`SettlementEngine::resolve_pending_release`].

use std::collections::HashSet;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use custodia_auth::{AuthorizationVerifier, TypedDataHasher, WalletDirectory};
use custodia_ledger::{FileStore, LedgerSnapshot, LedgerState, PendingRelease, StateStore};
use custodia_types::{
    AccountId, Amount, AssetDescriptor, AssetKey, CustodiaError, DomainConfig, EngineConfig,
    Receipt, Result, constants, short_account,
};

use crate::assets::{AssetCollaborator, MultiTokenReceiver, transfer_failure};

pub struct SettlementEngine {
    config: EngineConfig,
    verifier: AuthorizationVerifier,
    assets: Arc<dyn AssetCollaborator>,
    state: Mutex<LedgerState>,
    /// Owners whose release is between reserve and settle in this process.
    in_flight: Mutex<HashSet<AccountId>>,
    store: Option<Arc<dyn StateStore>>,
}

impl SettlementEngine {
    /// An engine with empty, in-memory state.
    pub fn new(
        config: EngineConfig,
        assets: Arc<dyn AssetCollaborator>,
        wallets: Arc<dyn WalletDirectory>,
    ) -> Result<Self> {
        config.validate()?;
        let verifier = AuthorizationVerifier::new(&config.domain, wallets);
        info!(
            operator = %config.operator,
            domain = %config.domain.name,
            version = %config.domain.version,
            "{} settlement engine v{} ready",
            constants::ENGINE_NAME,
            constants::VERSION
        );
        Ok(Self {
            config,
            verifier,
            assets,
            state: Mutex::new(LedgerState::new()),
            in_flight: Mutex::new(HashSet::new()),
            store: None,
        })
    }

    /// Attach durable storage, restoring its last snapshot if there is one.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Result<Self> {
        if let Some(snapshot) = store.load()? {
            let restored = LedgerState::from_snapshot(&snapshot)?;
            info!(
                balances = snapshot.balances.len(),
                nonces = snapshot.nonces.len(),
                pending = snapshot.pending.len(),
                "Ledger state restored"
            );
            if !snapshot.pending.is_empty() {
                warn!(
                    pending = snapshot.pending.len(),
                    "Restored releases await operator resolution"
                );
            }
            self.state = Mutex::new(restored);
        }
        self.store = Some(store);
        Ok(self)
    }

    /// [`Self::new`], plus a [`FileStore`] at `config.state_path` if one is set.
    pub fn open(
        config: EngineConfig,
        assets: Arc<dyn AssetCollaborator>,
        wallets: Arc<dyn WalletDirectory>,
    ) -> Result<Self> {
        let path = config.state_path.clone();
        let engine = Self::new(config, assets, wallets)?;
        match path {
            Some(path) => engine.with_store(Arc::new(FileStore::new(path))),
            None => Ok(engine),
        }
    }

    // =================================================================
    // Deposits
    // =================================================================

    /// Pull `amount` of `asset` from `caller` into custody and credit it.
    ///
    /// The caller moves its own funds, so no signature is involved. If the
    /// credit fails after the pull, the tokens are sent back.
    pub fn deposit(&self, caller: AccountId, asset: &AssetDescriptor, amount: Amount) -> Result<Receipt> {
        asset.validate()?;
        let credits = [(asset.key(), amount)];
        self.state.lock().check_deposits(&caller, &credits)?;

        self.assets
            .transfer_in(asset, caller, amount)
            .map_err(transfer_failure)?;

        let mut state = self.state.lock();
        if let Err(e) = state.apply_deposits(&caller, &credits) {
            drop(state);
            warn!(
                owner = %short_account(&caller),
                asset = %asset,
                error = %e,
                "Deposit could not be credited, refunding"
            );
            if let Err(refund) = self.assets.transfer_out(asset, caller, amount) {
                error!(
                    owner = %short_account(&caller),
                    asset = %asset,
                    amount = %amount,
                    error = %refund,
                    "Refund of uncredited deposit failed"
                );
            }
            return Err(e);
        }
        self.persist_settled(&state, "deposit");
        drop(state);

        info!(
            owner = %short_account(&caller),
            asset = %asset,
            amount = %amount,
            "Deposit credited"
        );
        Ok(Receipt::deposit(caller, *asset, amount))
    }

    /// Credit tokens a multi-token contract reports as pushed into custody.
    ///
    /// The collaborator must confirm the arrival first; a callback nobody
    /// backed with a transfer credits nothing.
    fn credit_arrived(&self, from: AccountId, credits: &[(AssetKey, Amount)]) -> Result<()> {
        self.state.lock().check_deposits(&from, credits)?;
        self.assets
            .confirm_received(from, credits)
            .map_err(transfer_failure)
            .inspect_err(|e| {
                warn!(
                    owner = %short_account(&from),
                    error = %e,
                    "Unconfirmed multi-token arrival rejected"
                );
            })?;
        let mut state = self.state.lock();
        state.apply_deposits(&from, credits)?;
        self.persist_settled(&state, "multi-token deposit");
        Ok(())
    }

    // =================================================================
    // Withdrawals
    // =================================================================

    /// Release `amount` of `asset` to `claimed_owner` on the strength of the
    /// owner's signed authorization. Only the operator may submit.
    pub fn withdraw_collateral(
        &self,
        caller: Address,
        asset: &AssetDescriptor,
        amount: Amount,
        signature: &[u8],
        claimed_owner: AccountId,
    ) -> Result<Receipt> {
        if caller != self.config.operator {
            warn!(caller = %caller, "Withdrawal submitted by non-operator");
            return Err(CustodiaError::Unauthorized { caller });
        }
        asset.validate()?;

        let nonce = self.nonce_of(&claimed_owner);
        let authorization = self
            .verifier
            .verify(claimed_owner, nonce, asset, amount, signature)
            .inspect_err(|e| {
                warn!(
                    owner = %short_account(&claimed_owner),
                    nonce,
                    code = e.code(),
                    "Withdrawal authorization rejected"
                );
            })?;

        self.reserve(&claimed_owner, &asset.key(), amount, nonce)?;

        let released = self
            .assets
            .transfer_out(asset, claimed_owner, amount)
            .map_err(transfer_failure);

        let mut state = self.state.lock();
        self.in_flight.lock().remove(&claimed_owner);
        if let Err(e) = released {
            match state.cancel_release(&claimed_owner) {
                Ok(_) => self.persist_settled(&state, "cancelled release"),
                Err(cancel) => error!(
                    owner = %short_account(&claimed_owner),
                    error = %cancel,
                    "Failed release could not be cancelled"
                ),
            }
            drop(state);
            warn!(
                owner = %short_account(&claimed_owner),
                error = %e,
                "Asset release failed, reservation cancelled"
            );
            return Err(e);
        }
        match state.finalize_release(&claimed_owner) {
            Ok(_) => self.persist_settled(&state, "withdrawal"),
            Err(e) => error!(
                owner = %short_account(&claimed_owner),
                asset = %asset,
                error = %e,
                "Assets released but reservation was gone"
            ),
        }
        drop(state);

        info!(
            owner = %short_account(&claimed_owner),
            asset = %asset,
            amount = %amount,
            nonce,
            digest = %authorization.digest,
            "Withdrawal released"
        );
        Ok(Receipt::withdrawal(
            claimed_owner,
            *asset,
            amount,
            nonce,
            authorization.digest,
        ))
    }

    /// Debit, consume the nonce and record the pending release, durably,
    /// before anything leaves custody.
    fn reserve(&self, owner: &AccountId, asset: &AssetKey, amount: Amount, nonce: u64) -> Result<()> {
        let mut state = self.state.lock();
        state.reserve_withdrawal(owner, asset, amount, nonce)?;
        if let Err(e) = self.persist(&state) {
            state.cancel_release(owner)?;
            warn!(
                owner = %short_account(owner),
                "Withdrawal not written ahead, nothing released"
            );
            return Err(e);
        }
        self.in_flight.lock().insert(*owner);
        Ok(())
    }

    /// Settle a release left pending by an interrupted withdrawal.
    /// `delivered` says whether the assets reached the owner; if not, the
    /// balance and nonce are restored. Operator only.
    pub fn resolve_pending_release(
        &self,
        caller: Address,
        owner: AccountId,
        delivered: bool,
    ) -> Result<PendingRelease> {
        if caller != self.config.operator {
            warn!(caller = %caller, "Release resolution submitted by non-operator");
            return Err(CustodiaError::Unauthorized { caller });
        }
        let mut state = self.state.lock();
        if self.in_flight.lock().contains(&owner) {
            return Err(CustodiaError::ReleasePending { owner });
        }
        let release = if delivered {
            state.finalize_release(&owner)?
        } else {
            state.cancel_release(&owner)?
        };
        self.persist(&state)?;
        drop(state);

        info!(
            owner = %short_account(&owner),
            asset = %release.asset,
            amount = %release.amount,
            nonce = release.nonce,
            delivered,
            "Pending release resolved"
        );
        Ok(release)
    }

    // =================================================================
    // Queries
    // =================================================================

    /// The nonce the owner's next authorization must be signed for.
    pub fn nonce_of(&self, owner: &AccountId) -> u64 {
        self.state.lock().nonce_of(owner)
    }

    pub fn balance_of(&self, owner: &AccountId, contract: Address, token_id: U256) -> Amount {
        self.state
            .lock()
            .balance_of(owner, &AssetKey::new(contract, token_id))
    }

    /// Releases reserved in the ledger whose transfer has not settled.
    pub fn pending_releases(&self) -> Vec<PendingRelease> {
        self.state.lock().pending_releases().copied().collect()
    }

    /// Check `Σ balances == deposited - withdrawn` for one asset.
    pub fn verify_supply(&self, asset: &AssetKey) -> Result<()> {
        self.state.lock().verify_supply(asset)
    }

    /// Conservation check across every asset on record.
    pub fn verify_all_supply(&self) -> Result<()> {
        self.state.lock().verify_all()
    }

    /// Whether `signature` is `owner`'s personal-message signature over
    /// `(asset, amount)`. Diagnostic only; it authorizes nothing.
    pub fn is_personal_withdrawal_signature(
        &self,
        asset: Address,
        amount: Amount,
        signature: &[u8],
        owner: AccountId,
    ) -> bool {
        custodia_auth::is_personal_withdrawal_signature(asset, amount, signature, owner)
    }

    pub fn operator(&self) -> Address {
        self.config.operator
    }

    pub fn domain(&self) -> &DomainConfig {
        &self.config.domain
    }

    /// Builds the digests owners sign for this engine.
    pub fn hasher(&self) -> &TypedDataHasher {
        self.verifier.hasher()
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        self.state.lock().snapshot()
    }

    /// Write the committed state. Called with the state lock held so the
    /// stored image always sits on a transaction boundary.
    fn persist(&self, state: &LedgerState) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let result = state.snapshot().and_then(|snapshot| store.persist(&snapshot));
        if let Err(e) = &result {
            error!(error = %e, "Failed to persist committed ledger state");
        }
        result
    }

    /// Persist after assets already moved. The move cannot be undone, so a
    /// failed write is logged and the next successful one catches up.
    fn persist_settled(&self, state: &LedgerState, what: &str) {
        if self.persist(state).is_err() {
            error!(transition = what, "Assets moved but the stored image lags");
        }
    }
}

impl MultiTokenReceiver for SettlementEngine {
    fn on_multi_token_received(
        &self,
        token_contract: Address,
        operator: Address,
        from: AccountId,
        id: U256,
        value: Amount,
        _data: &[u8],
    ) -> Result<[u8; 4]> {
        self.credit_arrived(from, &[(AssetKey::new(token_contract, id), value)])?;
        info!(
            owner = %short_account(&from),
            operator = %short_account(&operator),
            contract = %token_contract,
            id = %id,
            amount = %value,
            "Multi-token deposit credited"
        );
        Ok(constants::MULTI_TOKEN_RECEIVED)
    }

    fn on_multi_token_batch_received(
        &self,
        token_contract: Address,
        operator: Address,
        from: AccountId,
        ids: &[U256],
        values: &[Amount],
        _data: &[u8],
    ) -> Result<[u8; 4]> {
        if ids.len() != values.len() {
            return Err(CustodiaError::AssetTransferFailure {
                reason: format!(
                    "batch has {} ids but {} values",
                    ids.len(),
                    values.len()
                ),
            });
        }
        let credits: Vec<(AssetKey, Amount)> = ids
            .iter()
            .zip(values)
            .map(|(id, value)| (AssetKey::new(token_contract, *id), *value))
            .collect();
        self.credit_arrived(from, &credits)?;
        info!(
            owner = %short_account(&from),
            operator = %short_account(&operator),
            contract = %token_contract,
            positions = credits.len(),
            "Multi-token batch deposit credited"
        );
        Ok(constants::MULTI_TOKEN_BATCH_RECEIVED)
    }
}
