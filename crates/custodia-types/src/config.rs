//! Configuration types for a Custodia settlement engine.

use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{constants, CustodiaError, Result};

/// Configuration for a single settlement engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The only identity allowed to submit withdrawals. Immutable after construction.
    pub operator: Address,
    /// Typed-data domain the owners sign against.
    #[serde(default)]
    pub domain: DomainConfig,
    /// Snapshot file for durable state. `None` keeps state in memory only.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Configuration with default domain and logging, no persistence.
    #[must_use]
    pub fn new(operator: Address) -> Self {
        Self {
            operator,
            domain: DomainConfig::default(),
            state_path: None,
            logging: LoggingConfig::default(),
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CustodiaError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.operator == Address::ZERO {
            return Err(CustodiaError::Configuration(
                "operator must not be the zero address".into(),
            ));
        }
        if self.domain.name.is_empty() || self.domain.version.is_empty() {
            return Err(CustodiaError::Configuration(
                "domain name and version must be non-empty".into(),
            ));
        }
        Ok(())
    }
}

/// The `{name, version}` typed-data domain of the settlement engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    pub version: String,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            name: constants::DEFAULT_DOMAIN_NAME.to_string(),
            version: constants::DEFAULT_DOMAIN_VERSION.to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// `"pretty"` or `"json"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: constants::DEFAULT_LOG_LEVEL.to_string(),
            format: "pretty".to_string(),
        }
    }
}
