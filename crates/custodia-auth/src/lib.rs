//! # custodia-auth
//!
//! **Authorization plane**: turns a byte string into an authenticated claim
//! "owner O approves withdrawal W".
//!
//! ## Architecture
//!
//! 1. **TypedDataHasher**: schema-committing EIP-712 style digests
//! 2. **Recovery**: canonical 65-byte secp256k1 signature recovery
//! 3. **ContractWalletVerifier**: M-of-N owner signatures, strictly ascending
//! 4. **AuthorizationVerifier**: ordered strategy chain: EOA first, then wallet
//!
//! ## Verification Flow
//!
//! ```text
//! (nonce, asset, amount) → TypedDataHasher → digest
//!     → EoaStrategy.recover(digest) == owner ?            ─ yes → Authorized
//!     → ContractWalletStrategy(wallet digest over payload) ─ yes → Authorized
//!     → SignatureMismatch
//! ```

pub mod personal;
pub mod recover;
pub mod typed_data;
pub mod verifier;
pub mod wallet;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use personal::{is_personal_withdrawal_signature, personal_message_hash, withdrawal_message};
pub use recover::{RawSignature, recover_signer};
pub use typed_data::{TypedDataHasher, TypedStruct, TypedValue, WithdrawalAuthorization};
pub use verifier::{
    Authorization, AuthorizationMethod, AuthorizationRequest, AuthorizationStrategy,
    AuthorizationVerifier, ContractWalletStrategy, EoaStrategy,
};
pub use wallet::{ContractWalletVerifier, InMemoryWalletDirectory, WalletDirectory, WalletOwnerSet};
