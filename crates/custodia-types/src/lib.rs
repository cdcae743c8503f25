//! # custodia-types
//!
//! Shared types, errors, and configuration for the **Custodia** settlement ledger.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`Amount`], [`ReceiptId`]
//! - **Asset model**: [`AssetClass`], [`AssetKey`], [`AssetDescriptor`]
//! - **Receipt model**: [`Receipt`], [`ReceiptKind`]
//! - **Configuration**: [`EngineConfig`], [`DomainConfig`], [`LoggingConfig`]
//! - **Errors**: [`CustodiaError`] with `CU_ERR_` prefix codes
//! - **Constants**: signature sizes, curve constants, multi-token magic values

pub mod asset;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod receipt;

// Re-export all primary types at crate root for ergonomic imports:
//   use custodia_types::{AccountId, AssetDescriptor, CustodiaError, ...};

pub use asset::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use receipt::*;

// Constants are accessed via `custodia_types::constants::FOO`
// (not re-exported to avoid name collisions).
