//! System-wide constants for the Custodia settlement ledger.

/// Length of a single `(r, s, v)` ECDSA signature in bytes.
pub const SIGNATURE_LEN: usize = 65;

/// Canonical recovery byte for recovery id 0.
pub const V_LOW: u8 = 27;

/// Canonical recovery byte for recovery id 1.
pub const V_HIGH: u8 = 28;

/// secp256k1 group order divided by two (big-endian).
///
/// Signatures with `s` above this value are the malleated twin of a
/// low-`s` signature and are rejected.
pub const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// Two-byte prefix of an EIP-712 signing payload.
pub const TYPED_DATA_PREFIX: [u8; 2] = [0x19, 0x01];

/// Prefix of a personal (`eth_sign`) message before its decimal length.
pub const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Default settlement domain name.
pub const DEFAULT_DOMAIN_NAME: &str = "PredictionExchange";

/// Default settlement domain version.
pub const DEFAULT_DOMAIN_VERSION: &str = "0.1";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Value a multi-token receiver returns to accept a single transfer:
/// `bytes4(keccak256("onERC1155Received(address,address,uint256,uint256,bytes)"))`.
pub const MULTI_TOKEN_RECEIVED: [u8; 4] = [0xf2, 0x3a, 0x6e, 0x61];

/// Value a multi-token receiver returns to accept a batch transfer:
/// `bytes4(keccak256("onERC1155BatchReceived(address,address,uint256[],uint256[],bytes)"))`.
pub const MULTI_TOKEN_BATCH_RECEIVED: [u8; 4] = [0xbc, 0x19, 0x7c, 0x81];

/// On-disk snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 2;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Custodia";
