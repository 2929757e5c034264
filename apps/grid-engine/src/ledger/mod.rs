//! The durable trade ledger: the sole source of truth across restarts.
//!
//! Every buy fill becomes an OPEN row; attaching the paired protective
//! sell and closing on the sell fill complete the row's lifecycle. All
//! other components treat the ledger as authoritative; the JSON snapshot
//! is derived and best-effort only.

mod sqlite;

pub use sqlite::SqliteTradeLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::OrderId;

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database connection error.
    #[error("ledger connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("ledger query error: {0}")]
    Query(String),

    /// A stored value could not be decoded.
    #[error("ledger decode error in column '{column}': {reason}")]
    Decode {
        /// Offending column.
        column: String,
        /// Decode failure detail.
        reason: String,
    },

    /// A row id that should exist does not.
    #[error("ledger row {0} not found")]
    RowNotFound(i64),
}

/// Row lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    /// Bought, waiting to be sold.
    Open,
    /// Successfully sold (or closed as filled-while-offline).
    Closed,
}

impl TradeStatus {
    /// Database string encoding.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

/// One buy (and eventually its paired sell) as stored in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRow {
    /// Row id.
    pub id: i64,
    /// Ladder level (or the orphan sentinel).
    pub level: i64,
    /// Buy order id (unique; negative for synthesized rows).
    pub buy_order_id: OrderId,
    /// Bought quantity.
    pub buy_quantity: Decimal,
    /// Average buy price.
    pub buy_price: Decimal,
    /// Buy fill timestamp.
    pub buy_timestamp: DateTime<Utc>,
    /// Lifecycle status.
    pub status: TradeStatus,
    /// Paired protective sell order id, once attached.
    pub sell_order_id: Option<OrderId>,
    /// Sold quantity, once closed.
    pub sell_quantity: Option<Decimal>,
    /// Average sell price; `None` while open, and also `None` for
    /// amount-unknown closures recorded by reconciliation.
    pub sell_price: Option<Decimal>,
    /// Sell fill timestamp, once closed.
    pub sell_timestamp: Option<DateTime<Utc>>,
}

/// Outcome of [`TradeLedger::record_buy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordBuy {
    /// A new OPEN row was inserted.
    Recorded(i64),
    /// The buy order id already exists; nothing was inserted. This is the
    /// single de-duplication point for re-delivered fill events.
    Duplicate,
}

/// Port for the durable trade ledger.
#[async_trait]
pub trait TradeLedger: Send + Sync {
    /// Insert a new OPEN row for a buy fill.
    ///
    /// Idempotent on `buy_order_id`: a repeated id inserts nothing and
    /// reports [`RecordBuy::Duplicate`].
    async fn record_buy(
        &self,
        level: i64,
        buy_order_id: OrderId,
        quantity: Decimal,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<RecordBuy, LedgerError>;

    /// Associate a protective sell order with an open row.
    async fn attach_sell(&self, row_id: i64, sell_order_id: OrderId) -> Result<(), LedgerError>;

    /// Mark the row with this sell order id CLOSED.
    ///
    /// `price = None` records an amount-unknown closure (a sell that
    /// filled while the engine was offline). A missing match is logged
    /// and ignored, covering duplicate delivery.
    async fn close(
        &self,
        sell_order_id: OrderId,
        quantity: Decimal,
        price: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    /// All OPEN rows, ordered by level.
    async fn list_open(&self) -> Result<Vec<TradeRow>, LedgerError>;

    /// Look up a row by its sell order id.
    async fn find_by_sell_order(
        &self,
        sell_order_id: OrderId,
    ) -> Result<Option<TradeRow>, LedgerError>;
}
