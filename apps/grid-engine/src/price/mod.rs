//! Price source port.

mod alpaca;
mod mock;

pub use alpaca::{AlpacaPriceConfig, AlpacaPriceSource};
pub use mock::MockPriceSource;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Price source errors.
///
/// All of these are transient from the engine's point of view: the caller
/// logs and retries on the next poll cycle.
#[derive(Debug, Clone, Error)]
pub enum PriceFeedError {
    /// Transport failure.
    #[error("price feed connection error: {0}")]
    Connection(String),

    /// The API answered with an error.
    #[error("price feed API error {code}: {message}")]
    Api {
        /// HTTP status or provider error code.
        code: String,
        /// Error body.
        message: String,
    },

    /// No price available for the symbol right now.
    #[error("price data unavailable for {0}")]
    Unavailable(String),
}

/// Port for the latest-price lookup.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest traded price for a symbol.
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, PriceFeedError>;
}
