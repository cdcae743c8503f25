//! Personal-message (`eth_sign`) signatures over withdrawal parameters.
//!
//! This is a read-only diagnostic. It never authorizes a withdrawal; the
//! typed-data path in [`crate::verifier`] is the only one that does.

use alloy_primitives::{Address, B256, keccak256};
use custodia_types::{Amount, constants};

use crate::recover::recover_signer;

/// `keccak256("\x19Ethereum Signed Message:\n" || len(message) || message)`
#[must_use]
pub fn personal_message_hash(message: &[u8]) -> B256 {
    let mut buf = Vec::with_capacity(constants::PERSONAL_MESSAGE_PREFIX.len() + 20 + message.len());
    buf.extend_from_slice(constants::PERSONAL_MESSAGE_PREFIX.as_bytes());
    buf.extend_from_slice(message.len().to_string().as_bytes());
    buf.extend_from_slice(message);
    keccak256(buf)
}

/// ABI encoding of `(address asset, uint256 amount)`: two 32-byte words.
#[must_use]
pub fn withdrawal_message(asset: Address, amount: Amount) -> [u8; 64] {
    let mut out = [0u8; 64];
    out[..32].copy_from_slice(asset.into_word().as_slice());
    out[32..].copy_from_slice(&amount.to_be_bytes::<32>());
    out
}

/// Whether `signature` is `owner`'s personal signature over `(asset, amount)`.
///
/// Malformed signatures yield `false`.
#[must_use]
pub fn is_personal_withdrawal_signature(
    asset: Address,
    amount: Amount,
    signature: &[u8],
    owner: Address,
) -> bool {
    let hash = personal_message_hash(&withdrawal_message(asset, amount));
    recover_signer(&hash, signature).is_ok_and(|signer| signer == owner)
}
