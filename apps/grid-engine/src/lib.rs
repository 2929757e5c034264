// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Grid Engine - Rust Core Library
//!
//! Fill-driven grid trading execution engine. The engine buys an initial
//! lot at level 0, ladders conditional buys at falling trigger prices,
//! and pairs every filled buy with a protective good-till-cancelled sell.
//! All economic state is recorded in a durable SQLite ledger which is the
//! sole source of truth across restarts; a self-healing reconciliation
//! pass aligns the ledger with broker reality before trading resumes.
//!
//! # Architecture
//!
//! - `models`: domain value types (ladder, lot, orders, fills)
//! - `ledger`: durable trade ledger port + SQLite adapter
//! - `broker`: broker gateway port + simulated adapter
//! - `price`: price source port + Alpaca market-data adapter
//! - `engine`: reconciliation, fill state machine, buy queue, bootstrap
//! - `snapshot`: write-only diagnostic state dumps (never authoritative)
//!
//! External collaborators (broker session management, market-data
//! ingestion) sit behind the `broker` and `price` ports.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Broker gateway port and adapters.
pub mod broker;

/// Configuration loading and validation.
pub mod config;

/// Core engine: reconciliation, fills, buy queue, bootstrap.
pub mod engine;

/// Top-level error taxonomy.
pub mod error;

/// Durable trade ledger port and SQLite adapter.
pub mod ledger;

/// Domain value types.
pub mod models;

/// Price source port and adapters.
pub mod price;

/// Write-only diagnostic snapshot store.
pub mod snapshot;

/// Tracing initialization.
pub mod telemetry;

pub use broker::{BrokerError, BrokerGateway, FillSubscription, MockBrokerGateway};
pub use config::{Config, ConfigError, StrategyConfig};
pub use engine::{EngineState, GridEngine, ReconcileError};
pub use error::EngineError;
pub use ledger::{LedgerError, RecordBuy, SqliteTradeLedger, TradeLedger, TradeRow, TradeStatus};
pub use models::{
    FillEvent, Ladder, LadderError, Lot, OpenOrder, OrderAck, OrderId, OrderSide, OrderSpec,
    OrderStatus, OrderType, PositionReport, TimeInForce,
};
pub use price::{AlpacaPriceSource, MockPriceSource, PriceFeedError, PriceSource};
pub use snapshot::SnapshotStore;
