//! Typed-data hashing.
//!
//! A digest commits to three things at once:
//!
//! ```text
//! digest = keccak256(0x19 0x01 || hashStruct(domain) || hashStruct(message))
//! hashStruct(s) = keccak256(keccak256(encodeType(s)) || encodeData(s))
//! ```
//!
//! Because `encodeType` (struct name plus ordered, typed field list) is hashed
//! into every struct hash, two messages with different schemas can never
//! produce the same digest, even if their raw field values coincide.
//!
//! Unsigned integers render as `uint` in the type string, the literal schema
//! signed by the wallets and SDKs that produce withdrawal authorizations.

use alloy_primitives::{Address, B256, U256, keccak256};
use custodia_types::{Amount, AssetClass, AssetDescriptor, DomainConfig, constants};

/// Struct name of every domain descriptor.
pub const DOMAIN_STRUCT: &str = "EIP712Domain";

/// Withdrawal of a fungible asset.
pub const WITHDRAW_COLLATERAL: &str = "WithdrawCollateral";

/// Withdrawal of a multi-token position.
pub const WITHDRAW_POSITION: &str = "WithdrawPosition";

/// A single typed field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedValue {
    Uint(U256),
    Address(Address),
    Bytes32(B256),
    String(String),
    Bytes(Vec<u8>),
}

impl TypedValue {
    /// Type tag as it appears in `encodeType`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Uint(_) => "uint",
            Self::Address(_) => "address",
            Self::Bytes32(_) => "bytes32",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// The 32-byte word this value contributes to `encodeData`.
    ///
    /// Dynamic values (`string`, `bytes`) are replaced by the keccak of their contents.
    #[must_use]
    pub fn encode_word(&self) -> B256 {
        match self {
            Self::Uint(v) => B256::from(v.to_be_bytes::<32>()),
            Self::Address(a) => a.into_word(),
            Self::Bytes32(b) => *b,
            Self::String(s) => keccak256(s.as_bytes()),
            Self::Bytes(b) => keccak256(b),
        }
    }
}

/// A named struct with ordered, typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedStruct {
    name: String,
    fields: Vec<(String, TypedValue)>,
}

impl TypedStruct {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field. Field order is part of the schema.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: TypedValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, TypedValue)] {
        &self.fields
    }

    /// `Name(type1 name1,type2 name2,...)`
    #[must_use]
    pub fn encode_type(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(name, value)| format!("{} {name}", value.type_name()))
            .collect();
        format!("{}({})", self.name, fields.join(","))
    }

    #[must_use]
    pub fn type_hash(&self) -> B256 {
        keccak256(self.encode_type().as_bytes())
    }

    /// Concatenated field words, in declaration order.
    #[must_use]
    pub fn encode_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 * self.fields.len());
        for (_, value) in &self.fields {
            out.extend_from_slice(value.encode_word().as_slice());
        }
        out
    }

    /// `keccak256(typeHash || encodeData)`
    #[must_use]
    pub fn struct_hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(32 + 32 * self.fields.len());
        buf.extend_from_slice(self.type_hash().as_slice());
        buf.extend_from_slice(&self.encode_data());
        keccak256(buf)
    }
}

/// The settlement engine's `{name, version}` domain descriptor.
#[must_use]
pub fn settlement_domain(domain: &DomainConfig) -> TypedStruct {
    TypedStruct::new(DOMAIN_STRUCT)
        .field("name", TypedValue::String(domain.name.clone()))
        .field("version", TypedValue::String(domain.version.clone()))
}

/// The plaintext of a withdrawal authorization. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalAuthorization {
    pub nonce: u64,
    pub asset: AssetDescriptor,
    pub amount: Amount,
}

impl WithdrawalAuthorization {
    #[must_use]
    pub fn new(nonce: u64, asset: AssetDescriptor, amount: Amount) -> Self {
        Self {
            nonce,
            asset,
            amount,
        }
    }

    /// The typed message the owner signs. Schema is selected by asset class.
    #[must_use]
    pub fn to_typed(&self) -> TypedStruct {
        let nonce = TypedValue::Uint(U256::from(self.nonce));
        match self.asset.class {
            AssetClass::Fungible => TypedStruct::new(WITHDRAW_COLLATERAL)
                .field("nonce", nonce)
                .field("collateralToken", TypedValue::Address(self.asset.contract))
                .field("amount", TypedValue::Uint(self.amount)),
            AssetClass::MultiToken => TypedStruct::new(WITHDRAW_POSITION)
                .field("nonce", nonce)
                .field("positionToken", TypedValue::Address(self.asset.contract))
                .field("positionId", TypedValue::Uint(self.asset.token_id))
                .field("amount", TypedValue::Uint(self.amount)),
        }
    }
}

/// Digest builder bound to one domain. The domain separator is computed once.
#[derive(Debug, Clone)]
pub struct TypedDataHasher {
    domain: TypedStruct,
    domain_separator: B256,
}

impl TypedDataHasher {
    /// Hasher for the settlement domain described by `config`.
    #[must_use]
    pub fn new(config: &DomainConfig) -> Self {
        Self::from_domain(settlement_domain(config))
    }

    /// Hasher for an arbitrary domain struct (e.g. a wallet's own domain).
    #[must_use]
    pub fn from_domain(domain: TypedStruct) -> Self {
        let domain_separator = domain.struct_hash();
        Self {
            domain,
            domain_separator,
        }
    }

    #[must_use]
    pub fn domain(&self) -> &TypedStruct {
        &self.domain
    }

    #[must_use]
    pub fn domain_separator(&self) -> B256 {
        self.domain_separator
    }

    /// `0x19 0x01 || domainSeparator || structHash`: the raw bytes that get hashed.
    #[must_use]
    pub fn signing_payload(&self, message: &TypedStruct) -> [u8; 66] {
        let mut out = [0u8; 66];
        out[..2].copy_from_slice(&constants::TYPED_DATA_PREFIX);
        out[2..34].copy_from_slice(self.domain_separator.as_slice());
        out[34..].copy_from_slice(message.struct_hash().as_slice());
        out
    }

    #[must_use]
    pub fn digest(&self, message: &TypedStruct) -> B256 {
        keccak256(self.signing_payload(message))
    }
}
