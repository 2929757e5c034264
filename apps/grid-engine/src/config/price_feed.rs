//! Price feed settings.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Which price source to wire up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceFeedProvider {
    /// Alpaca Market Data REST API.
    Alpaca,
    /// In-process mock (tests and dry runs).
    Mock,
}

/// Price feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    /// Provider selection.
    #[serde(default = "default_provider")]
    pub provider: PriceFeedProvider,
    /// API key id (Alpaca).
    #[serde(default)]
    pub api_key: String,
    /// API secret key (Alpaca).
    #[serde(default)]
    pub api_secret: String,
    /// Data API base URL (Alpaca).
    #[serde(default = "default_data_base_url")]
    pub data_base_url: String,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            api_secret: String::new(),
            data_base_url: default_data_base_url(),
        }
    }
}

impl PriceFeedConfig {
    /// Validate the price feed section.
    ///
    /// # Errors
    ///
    /// Returns an error if the Alpaca provider is selected without
    /// credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider == PriceFeedProvider::Alpaca
            && (self.api_key.is_empty() || self.api_secret.is_empty())
        {
            return Err(ConfigError::Validation(
                "price_feed.api_key and price_feed.api_secret are required for the alpaca provider"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

const fn default_provider() -> PriceFeedProvider {
    PriceFeedProvider::Mock
}

fn default_data_base_url() -> String {
    "https://data.alpaca.markets".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_mock_and_valid() {
        let config = PriceFeedConfig::default();
        assert_eq!(config.provider, PriceFeedProvider::Mock);
        config.validate().unwrap();
    }

    #[test]
    fn alpaca_without_credentials_rejected() {
        let config = PriceFeedConfig {
            provider: PriceFeedProvider::Alpaca,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn provider_parses_lowercase() {
        let config: PriceFeedConfig =
            serde_yaml_bw::from_str("provider: alpaca\napi_key: k\napi_secret: s").unwrap();
        assert_eq!(config.provider, PriceFeedProvider::Alpaca);
        config.validate().unwrap();
    }
}
