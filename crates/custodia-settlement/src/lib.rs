//! # custodia-settlement
//!
//! **Custody plane**: the [`SettlementEngine`] that holds assets on behalf of
//! owners, credits deposits, and releases withdrawals that the operator
//! relays with the owner's signed authorization.
//!
//! ## Architecture
//!
//! The engine ties together:
//! 1. [`custodia_auth::AuthorizationVerifier`]: who approved this withdrawal?
//! 2. [`custodia_ledger::LedgerState`]: balances, nonces, supply totals
//! 3. [`AssetCollaborator`]: the external token contracts
//! 4. [`custodia_ledger::StateStore`]: snapshots, written ahead of every release
//!
//! ## Entry Points
//!
//! - `deposit`: owner moves its own funds in; no signature
//! - `on_multi_token_received` / `on_multi_token_batch_received`: pushed positions
//! - `withdraw_collateral`: operator-only, signature-gated
//! - `resolve_pending_release`: operator-only, settles a release a crash interrupted

pub mod assets;
pub mod engine;
pub mod logging;

pub use assets::{AssetCollaborator, InMemoryAssetBank, MultiTokenReceiver};
pub use engine::SettlementEngine;
pub use logging::{LogFormat, init_from_config, init_logging, try_init_logging};
