//! A lot: one open buy position awaiting its paired protective sell.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{OrderId, OrderSpec, OrderSide, OrderType, TimeInForce};
use super::round_cents;
use crate::ledger::TradeRow;

/// Sentinel level for orphan lots synthesized by reconciliation from
/// broker position the ledger cannot otherwise explain.
pub const ORPHAN_LEVEL: i64 = -1;

/// One open position: exists only while its ledger row is OPEN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    /// Ladder level (or [`ORPHAN_LEVEL`]).
    pub level: i64,
    /// Purchased quantity.
    pub quantity: Decimal,
    /// Average purchase price.
    pub purchase_price: Decimal,
    /// Target price of the paired protective sell.
    pub sell_target_price: Decimal,
    /// The protective sell's broker order id, once placed.
    pub sell_order_id: Option<OrderId>,
    /// Backing ledger row id.
    pub row_id: i64,
}

impl Lot {
    /// Create a lot; the sell target is derived from the purchase price
    /// and the profit-target ratio, rounded to cents.
    #[must_use]
    pub fn new(
        level: i64,
        quantity: Decimal,
        purchase_price: Decimal,
        profit_target_ratio: Decimal,
        row_id: i64,
    ) -> Self {
        Self {
            level,
            quantity,
            purchase_price,
            sell_target_price: round_cents(purchase_price * profit_target_ratio),
            sell_order_id: None,
            row_id,
        }
    }

    /// Rebuild a lot from an OPEN ledger row.
    #[must_use]
    pub fn from_row(row: &TradeRow, profit_target_ratio: Decimal) -> Self {
        Self {
            level: row.level,
            quantity: row.buy_quantity,
            purchase_price: row.buy_price,
            sell_target_price: round_cents(row.buy_price * profit_target_ratio),
            sell_order_id: row.sell_order_id,
            row_id: row.id,
        }
    }

    /// The protective sell for this lot: GTC limit at the target price,
    /// eligible outside regular trading hours.
    #[must_use]
    pub fn protective_sell_spec(&self, symbol: &str) -> OrderSpec {
        OrderSpec {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            quantity: self.quantity,
            limit_price: self.sell_target_price,
            trigger_price: None,
            time_in_force: TimeInForce::Gtc,
            outside_rth: true,
        }
    }
}
