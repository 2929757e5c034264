//! Order-related types shared by the broker port and the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broker-native order identifier.
///
/// Signed so that reconciliation can synthesize ledger rows with negated
/// ids that can never collide with real broker-assigned ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    /// Create an order id from its broker-native value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Negated counterpart, used as a synthetic buy-order id when a row is
    /// reconstructed from an open sell order.
    #[must_use]
    pub const fn synthetic(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Limit order - execute at the limit price or better.
    Limit,
    /// Limit-if-touched - armed at the trigger price, then works as a
    /// limit order. Used for the conditional ladder buys.
    LimitIfTouched,
}

/// Time in force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Valid for the current trading day only.
    Day,
    /// Good-till-cancelled.
    Gtc,
}

/// Order status as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Submitted, not yet acknowledged.
    PendingSubmit,
    /// Working at the broker.
    Accepted,
    /// Completely filled.
    Filled,
    /// Cancelled.
    Cancelled,
    /// Rejected by the broker.
    Rejected,
}

impl OrderStatus {
    /// Returns true if the order can no longer fill.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

/// Request to place an order with the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Symbol to trade.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price.
    pub limit_price: Decimal,
    /// Trigger price (limit-if-touched orders only).
    pub trigger_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Eligible outside regular trading hours.
    pub outside_rth: bool,
}

impl OrderSpec {
    /// A day limit order.
    #[must_use]
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            limit_price,
            trigger_price: None,
            time_in_force: TimeInForce::Day,
            outside_rth: false,
        }
    }

    /// A conditional buy with trigger-equals-limit semantics: arms once
    /// price touches the trigger, then executes as a limit at that price.
    #[must_use]
    pub fn conditional_buy(symbol: impl Into<String>, quantity: Decimal, trigger: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: OrderSide::Buy,
            order_type: OrderType::LimitIfTouched,
            quantity,
            limit_price: trigger,
            trigger_price: Some(trigger),
            time_in_force: TimeInForce::Gtc,
            outside_rth: true,
        }
    }

    /// Set time in force.
    #[must_use]
    pub const fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Enable execution outside regular trading hours.
    #[must_use]
    pub const fn with_outside_rth(mut self) -> Self {
        self.outside_rth = true;
        self
    }
}

/// Acknowledgment from the broker after submission or a status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Broker-assigned order id.
    pub order_id: OrderId,
    /// Current status.
    pub status: OrderStatus,
    /// Filled quantity so far.
    pub filled_quantity: Decimal,
    /// Average fill price, if any quantity filled.
    pub avg_fill_price: Option<Decimal>,
}

/// An order currently working at the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    /// Broker-assigned order id.
    pub order_id: OrderId,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Remaining quantity.
    pub quantity: Decimal,
    /// Limit price.
    pub limit_price: Decimal,
    /// Trigger price, if conditional.
    pub trigger_price: Option<Decimal>,
}

/// Broker-reported position for the instrument.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionReport {
    /// Signed position quantity.
    pub quantity: Decimal,
    /// Average cost per share.
    pub average_cost: Decimal,
}

impl PositionReport {
    /// A flat (zero) position.
    #[must_use]
    pub const fn flat() -> Self {
        Self {
            quantity: Decimal::ZERO,
            average_cost: Decimal::ZERO,
        }
    }
}

/// A fill event delivered by the broker's execution stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    /// Order id the fill belongs to.
    pub order_id: OrderId,
    /// Side of the filled order.
    pub side: OrderSide,
    /// Filled quantity.
    pub quantity: Decimal,
    /// Average fill price.
    pub price: Decimal,
    /// Fill timestamp.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_id_synthetic_negates() {
        let id = OrderId::new(42);
        assert_eq!(id.synthetic().value(), -42);
        assert_eq!(id.synthetic().synthetic(), id);
    }

    #[test]
    fn order_status_terminal() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::PendingSubmit.is_terminal());
        assert!(!OrderStatus::Accepted.is_terminal());
    }

    #[test]
    fn limit_spec_defaults() {
        let spec = OrderSpec::limit("TQQQ", OrderSide::Buy, dec!(100), dec!(50.13));
        assert_eq!(spec.order_type, OrderType::Limit);
        assert_eq!(spec.time_in_force, TimeInForce::Day);
        assert!(spec.trigger_price.is_none());
        assert!(!spec.outside_rth);
    }

    #[test]
    fn conditional_buy_trigger_equals_limit() {
        let spec = OrderSpec::conditional_buy("TQQQ", dec!(100), dec!(49.50));
        assert_eq!(spec.order_type, OrderType::LimitIfTouched);
        assert_eq!(spec.trigger_price, Some(dec!(49.50)));
        assert_eq!(spec.limit_price, dec!(49.50));
        assert_eq!(spec.time_in_force, TimeInForce::Gtc);
        assert!(spec.outside_rth);
    }
}
