//! Traded instrument configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// The single instrument the engine trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Ticker symbol.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Exchange routing hint.
    #[serde(default = "default_exchange")]
    pub exchange: String,
    /// Quote currency.
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            exchange: default_exchange(),
            currency: default_currency(),
        }
    }
}

impl InstrumentConfig {
    /// Validate the instrument section.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Validation(
                "instrument.symbol must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_symbol() -> String {
    "TQQQ".to_string()
}

fn default_exchange() -> String {
    "SMART".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = InstrumentConfig::default();
        assert_eq!(config.symbol, "TQQQ");
        assert_eq!(config.exchange, "SMART");
        assert_eq!(config.currency, "USD");
        config.validate().unwrap();
    }

    #[test]
    fn empty_symbol_rejected() {
        let config = InstrumentConfig {
            symbol: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
