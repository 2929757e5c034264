//! Alpaca Market Data latest-trade price source.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{PriceFeedError, PriceSource};

/// Settings for the Alpaca market-data client.
#[derive(Debug, Clone)]
pub struct AlpacaPriceConfig {
    /// API key id.
    pub api_key: String,
    /// API secret key.
    pub api_secret: String,
    /// Data API base URL.
    pub data_base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl AlpacaPriceConfig {
    /// Config for the production data API.
    #[must_use]
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
            data_base_url: "https://data.alpaca.markets".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Price source backed by Alpaca's latest-trade endpoint.
#[derive(Debug)]
pub struct AlpacaPriceSource {
    client: reqwest::Client,
    config: AlpacaPriceConfig,
}

impl AlpacaPriceSource {
    /// Create the price source.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are empty or the HTTP client
    /// cannot be built.
    pub fn new(config: AlpacaPriceConfig) -> Result<Self, PriceFeedError> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(PriceFeedError::Connection(
                "missing Alpaca API credentials".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PriceFeedError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn fetch_latest_trade(&self, symbol: &str) -> Result<LatestTradeResponse, PriceFeedError> {
        let url = format!(
            "{}/v2/stocks/{}/trades/latest",
            self.config.data_base_url,
            symbol.to_uppercase()
        );

        let response = self
            .client
            .get(&url)
            .header("APCA-API-KEY-ID", &self.config.api_key)
            .header("APCA-API-SECRET-KEY", &self.config.api_secret)
            .send()
            .await
            .map_err(|e| PriceFeedError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PriceFeedError::Api {
                code: status.as_u16().to_string(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PriceFeedError::Connection(e.to_string()))
    }
}

#[async_trait]
impl PriceSource for AlpacaPriceSource {
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, PriceFeedError> {
        let response = self.fetch_latest_trade(symbol).await?;
        let price = Decimal::try_from(response.trade.p)
            .map_err(|_| PriceFeedError::Unavailable(symbol.to_string()))?;

        if price <= Decimal::ZERO {
            return Err(PriceFeedError::Unavailable(symbol.to_string()));
        }
        Ok(price)
    }
}

// API response types

#[derive(Debug, serde::Deserialize)]
struct LatestTradeResponse {
    trade: LatestTradeData,
}

#[derive(Debug, serde::Deserialize)]
struct LatestTradeData {
    /// Trade price.
    p: f64,
}
