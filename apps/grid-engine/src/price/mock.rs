//! Mock price source for testing and paper runs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{PriceFeedError, PriceSource};

/// Price source with settable per-symbol prices.
#[derive(Debug, Default)]
pub struct MockPriceSource {
    prices: RwLock<HashMap<String, Decimal>>,
}

impl MockPriceSource {
    /// Create an empty mock feed (every lookup reports unavailable).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the price for a symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        let mut prices = self
            .prices
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        prices.insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, PriceFeedError> {
        let prices = self
            .prices
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        prices
            .get(symbol)
            .copied()
            .ok_or_else(|| PriceFeedError::Unavailable(symbol.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn returns_set_price() {
        let feed = MockPriceSource::new();
        feed.set_price("TQQQ", dec!(50.00));
        assert_eq!(feed.latest_price("TQQQ").await.unwrap(), dec!(50.00));
    }

    #[tokio::test]
    async fn unknown_symbol_is_unavailable() {
        let feed = MockPriceSource::new();
        assert!(matches!(
            feed.latest_price("SPY").await,
            Err(PriceFeedError::Unavailable(_))
        ));
    }
}
