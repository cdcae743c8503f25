//! # custodia-ledger
//!
//! **State plane**: balances, replay-protection nonces, and supply accounting,
//! plus the crash-consistent snapshot they persist as.
//!
//! Nothing in this crate locks. The settlement engine owns a single
//! [`LedgerState`] behind a mutex, and every transition here is a plain
//! `&mut self` method that validates before it mutates.
//!
//! ```text
//! deposit    → Ledger.credit  + Supply.deposited
//! withdrawal → Ledger.debit   + NonceStore.consume + Supply.withdrawn (pending)
//! settle     → finalize, or cancel and undo all three
//! commit     → LedgerSnapshot → StateStore.persist
//! ```

pub mod ledger;
pub mod nonce_store;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod supply_conservation;

pub use ledger::Ledger;
pub use nonce_store::NonceStore;
pub use snapshot::{BalanceRow, LedgerSnapshot, NonceRow, PendingRow, SupplyRow};
pub use state::{LedgerState, PendingRelease};
pub use store::{FileStore, MemoryStore, StateStore};
pub use supply_conservation::SupplyConservation;
