//! # Structured Logging
//!
//! Installs a `tracing` subscriber with either pretty or JSON output and
//! `RUST_LOG`-style filtering. Output goes to stderr.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use custodia_types::{CustodiaError, LoggingConfig, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable. For local development.
    #[default]
    Pretty,
    /// One JSON object per line. For log aggregation.
    Json,
}

impl LogFormat {
    /// `"json"` (any case) is JSON; anything else is pretty.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `default_level` when set, e.g.
/// `RUST_LOG=custodia_settlement=debug,custodia_auth=info`.
///
/// # Errors
/// `Configuration` if a global subscriber is already installed.
pub fn try_init_logging(default_level: &str, format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .try_init(),
    };
    installed.map_err(|e| CustodiaError::Configuration(format!("logging: {e}")))?;

    tracing::info!("logging initialized (format={format:?})");
    Ok(())
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(default_level: &str, format: LogFormat) {
    let _ = try_init_logging(default_level, format);
}

/// Install the subscriber described by an engine's [`LoggingConfig`].
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    try_init_logging(&config.level, LogFormat::from_str_lossy(&config.format))
}
