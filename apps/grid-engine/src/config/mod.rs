//! Configuration for the grid engine.
//!
//! Loaded from a YAML file with `${VAR}` / `${VAR:-default}` environment
//! variable interpolation, validated at startup. Malformed configuration
//! is fatal.
//!
//! # Usage
//!
//! ```rust,ignore
//! use grid_engine::config::load_config;
//!
//! // Load from default path (grid-engine.yaml)
//! let config = load_config(None)?;
//! println!("symbol: {}", config.instrument.symbol);
//! ```

mod instrument;
mod persistence;
mod price_feed;
mod strategy;

pub use instrument::InstrumentConfig;
pub use persistence::PersistenceConfig;
pub use price_feed::{PriceFeedConfig, PriceFeedProvider};
pub use strategy::StrategyConfig;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("config validation failed: {0}")]
    Validation(String),

    /// Missing required environment variable.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Traded instrument.
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Grid strategy parameters.
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Ledger and snapshot paths.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Price feed settings.
    #[serde(default)]
    pub price_feed: PriceFeedConfig,
}

impl Config {
    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::Validation`] describing the first
    /// violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.instrument.validate()?;
        self.strategy.validate()?;
        self.price_feed.validate()
    }
}

/// Load configuration from a YAML file with env-var interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to
///   "grid-engine.yaml".
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or
/// validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("grid-engine.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_string(),
        source: e,
    })?;

    let contents = interpolate_env(&contents)?;
    let config: Config = serde_yaml_bw::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Replace `${VAR}` and `${VAR:-default}` references with environment
/// variable values.
fn interpolate_env(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            ConfigError::Validation("unterminated ${...} reference".to_string())
        })?;

        let expr = &after[..end];
        let (name, default) = match expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (expr, None),
        };

        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => match default {
                Some(default) => out.push_str(default),
                None => return Err(ConfigError::MissingEnvVar(name.to_string())),
            },
        }

        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
