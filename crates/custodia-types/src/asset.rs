//! Asset model for the custody ledger.
//!
//! Two asset classes are held in custody:
//!
//! - **Fungible** (ERC20-like): identified by the token contract alone.
//! - **MultiToken** (ERC1155-like): identified by contract + token id.
//!
//! Ledger entries are keyed by [`AssetKey`], where the token id is the zero
//! sentinel for fungible assets.

use std::fmt;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{CustodiaError, Result};

/// Which transfer standard an asset follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum AssetClass {
    /// ERC20-like fungible token.
    Fungible,
    /// ERC1155-like semi-fungible token, identified by a token id.
    MultiToken,
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fungible => write!(f, "FUNGIBLE"),
            Self::MultiToken => write!(f, "MULTI_TOKEN"),
        }
    }
}

/// Ledger key component: `(assetContract, tokenId)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AssetKey {
    /// The asset contract address.
    pub contract: Address,
    /// Token id within the contract; zero for fungible assets.
    pub token_id: U256,
}

impl AssetKey {
    #[must_use]
    pub fn new(contract: Address, token_id: U256) -> Self {
        Self { contract, token_id }
    }

    /// Key of a fungible asset (zero token id).
    #[must_use]
    pub fn fungible(contract: Address) -> Self {
        Self::new(contract, U256::ZERO)
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.contract, self.token_id)
    }
}

/// Full description of an asset as supplied to deposit and withdrawal calls.
///
/// The class selects both the transfer interface used against the asset
/// collaborator and the typed-data schema the owner signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub class: AssetClass,
    pub contract: Address,
    pub token_id: U256,
}

impl AssetDescriptor {
    /// A fungible asset. The token id is always the zero sentinel.
    #[must_use]
    pub fn fungible(contract: Address) -> Self {
        Self {
            class: AssetClass::Fungible,
            contract,
            token_id: U256::ZERO,
        }
    }

    /// A multi-token asset position.
    #[must_use]
    pub fn multi_token(contract: Address, token_id: U256) -> Self {
        Self {
            class: AssetClass::MultiToken,
            contract,
            token_id,
        }
    }

    /// The ledger key for this asset.
    #[must_use]
    pub fn key(&self) -> AssetKey {
        AssetKey::new(self.contract, self.token_id)
    }

    #[must_use]
    pub fn is_fungible(&self) -> bool {
        self.class == AssetClass::Fungible
    }

    /// A fungible descriptor must carry the zero token id: the
    /// `WithdrawCollateral` schema does not sign one.
    pub fn validate(&self) -> Result<()> {
        if self.is_fungible() && self.token_id != U256::ZERO {
            return Err(CustodiaError::InvalidAsset(format!(
                "fungible {} carries token id {}",
                self.contract, self.token_id
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AssetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            AssetClass::Fungible => write!(f, "{}:{}", self.class, self.contract),
            AssetClass::MultiToken => {
                write!(f, "{}:{}#{}", self.class, self.contract, self.token_id)
            }
        }
    }
}
