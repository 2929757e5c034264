//! Grid strategy parameters.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Parameters of the grid: ratios, queue depth, and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Path to the ladder CSV (level, quantity per row).
    #[serde(default = "default_ladder_path")]
    pub ladder_path: String,

    /// Protective sell target = purchase price x this ratio.
    #[serde(default = "default_profit_target_ratio")]
    pub profit_target_ratio: Decimal,

    /// Each successive buy trigger = reference price x this ratio.
    #[serde(default = "default_buy_trigger_ratio")]
    pub buy_trigger_ratio: Decimal,

    /// Level-0 limit = market price x this ratio (marketable, bounded
    /// slippage).
    #[serde(default = "default_l0_buffer_ratio")]
    pub l0_buffer_ratio: Decimal,

    /// Number of conditional buys kept working ahead of the next level.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Main loop poll interval, seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Bootstrap order timeout, seconds.
    #[serde(default = "default_order_timeout_secs")]
    pub order_timeout_secs: u64,

    /// Bootstrap status poll cadence, seconds.
    #[serde(default = "default_status_poll_secs")]
    pub status_poll_secs: u64,

    /// Settle delay after bulk cancellations, milliseconds.
    #[serde(default = "default_cancel_settle_ms")]
    pub cancel_settle_ms: u64,

    /// Broker-position divergence above this is an orphan condition.
    #[serde(default = "default_orphan_tolerance")]
    pub orphan_tolerance: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ladder_path: default_ladder_path(),
            profit_target_ratio: default_profit_target_ratio(),
            buy_trigger_ratio: default_buy_trigger_ratio(),
            l0_buffer_ratio: default_l0_buffer_ratio(),
            queue_depth: default_queue_depth(),
            poll_interval_secs: default_poll_interval_secs(),
            order_timeout_secs: default_order_timeout_secs(),
            status_poll_secs: default_status_poll_secs(),
            cancel_settle_ms: default_cancel_settle_ms(),
            orphan_tolerance: default_orphan_tolerance(),
        }
    }
}

impl StrategyConfig {
    /// Main loop poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Bootstrap order timeout.
    #[must_use]
    pub const fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_secs)
    }

    /// Bootstrap status poll cadence.
    #[must_use]
    pub const fn status_poll(&self) -> Duration {
        Duration::from_secs(self.status_poll_secs)
    }

    /// Settle delay after bulk cancellations.
    #[must_use]
    pub const fn cancel_settle(&self) -> Duration {
        Duration::from_millis(self.cancel_settle_ms)
    }

    /// Validate the strategy section.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profit_target_ratio <= Decimal::ONE {
            return Err(ConfigError::Validation(format!(
                "strategy.profit_target_ratio must exceed 1, got {}",
                self.profit_target_ratio
            )));
        }
        if self.buy_trigger_ratio <= Decimal::ZERO || self.buy_trigger_ratio >= Decimal::ONE {
            return Err(ConfigError::Validation(format!(
                "strategy.buy_trigger_ratio must be in (0, 1), got {}",
                self.buy_trigger_ratio
            )));
        }
        if self.l0_buffer_ratio < Decimal::ONE {
            return Err(ConfigError::Validation(format!(
                "strategy.l0_buffer_ratio must be at least 1, got {}",
                self.l0_buffer_ratio
            )));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::Validation(
                "strategy.queue_depth must be at least 1".to_string(),
            ));
        }
        if self.orphan_tolerance < Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "strategy.orphan_tolerance must not be negative, got {}",
                self.orphan_tolerance
            )));
        }
        Ok(())
    }
}

fn default_ladder_path() -> String {
    "ladder.csv".to_string()
}

fn default_profit_target_ratio() -> Decimal {
    Decimal::new(101, 2) // 1.01
}

fn default_buy_trigger_ratio() -> Decimal {
    Decimal::new(99, 2) // 0.99
}

fn default_l0_buffer_ratio() -> Decimal {
    Decimal::new(10025, 4) // 1.0025
}

const fn default_queue_depth() -> usize {
    3
}

const fn default_poll_interval_secs() -> u64 {
    20
}

const fn default_order_timeout_secs() -> u64 {
    120
}

const fn default_status_poll_secs() -> u64 {
    2
}

const fn default_cancel_settle_ms() -> u64 {
    500
}

fn default_orphan_tolerance() -> Decimal {
    Decimal::new(1, 1) // 0.1
}
