//! Domain value types for the grid engine.

mod ladder;
mod lot;
mod order;

pub use ladder::{Ladder, LadderError};
pub use lot::{Lot, ORPHAN_LEVEL};
pub use order::{
    FillEvent, OpenOrder, OrderAck, OrderId, OrderSide, OrderSpec, OrderStatus, OrderType,
    PositionReport, TimeInForce,
};

use rust_decimal::{Decimal, RoundingStrategy};

/// Round a price to currency precision (cents, half away from zero).
#[must_use]
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
