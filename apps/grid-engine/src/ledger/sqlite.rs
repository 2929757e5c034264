//! SQLite-backed trade ledger.
//!
//! Prices, quantities, and timestamps are stored as TEXT (decimal string
//! and RFC 3339 respectively) so no precision is lost round-tripping
//! through SQLite's dynamic typing.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::{debug, info, warn};

use super::{LedgerError, RecordBuy, TradeLedger, TradeRow, TradeStatus};
use crate::models::OrderId;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level INTEGER NOT NULL,

    buy_order_id INTEGER NOT NULL UNIQUE,
    buy_quantity TEXT NOT NULL,
    buy_price TEXT NOT NULL,
    buy_timestamp TEXT NOT NULL,

    status TEXT NOT NULL CHECK(status IN ('OPEN', 'CLOSED')),

    sell_order_id INTEGER UNIQUE,
    sell_quantity TEXT,
    sell_price TEXT,
    sell_timestamp TEXT
)
";

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Query(err.to_string())
    }
}

/// Trade ledger backed by a SQLite database file.
pub struct SqliteTradeLedger {
    pool: SqlitePool,
}

impl SqliteTradeLedger {
    /// Open (creating if missing) the ledger database and ensure the
    /// schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        let ledger = Self { pool };
        ledger.migrate().await?;
        info!(path = %path.as_ref().display(), "trade ledger opened");
        Ok(ledger)
    }

    /// Open an in-memory ledger (tests and dry runs).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open_in_memory() -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::new().filename(":memory:");

        // A single immortal connection: the database lives and dies with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        let ledger = Self { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_trade(row: &SqliteRow) -> Result<TradeRow, LedgerError> {
        let status: String = row.try_get("status")?;
        let status = match status.as_str() {
            "OPEN" => TradeStatus::Open,
            "CLOSED" => TradeStatus::Closed,
            other => {
                return Err(LedgerError::Decode {
                    column: "status".to_string(),
                    reason: format!("unknown status '{other}'"),
                });
            }
        };

        Ok(TradeRow {
            id: row.try_get("id")?,
            level: row.try_get("level")?,
            buy_order_id: OrderId::new(row.try_get("buy_order_id")?),
            buy_quantity: decode_decimal(row, "buy_quantity")?,
            buy_price: decode_decimal(row, "buy_price")?,
            buy_timestamp: decode_timestamp(row, "buy_timestamp")?,
            status,
            sell_order_id: row
                .try_get::<Option<i64>, _>("sell_order_id")?
                .map(OrderId::new),
            sell_quantity: decode_decimal_opt(row, "sell_quantity")?,
            sell_price: decode_decimal_opt(row, "sell_price")?,
            sell_timestamp: decode_timestamp_opt(row, "sell_timestamp")?,
        })
    }
}

fn decode_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, LedgerError> {
    let text: String = row.try_get(column)?;
    Decimal::from_str(&text).map_err(|e| LedgerError::Decode {
        column: column.to_string(),
        reason: e.to_string(),
    })
}

fn decode_decimal_opt(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, LedgerError> {
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| {
        Decimal::from_str(&t).map_err(|e| LedgerError::Decode {
            column: column.to_string(),
            reason: e.to_string(),
        })
    })
    .transpose()
}

fn decode_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, LedgerError> {
    let text: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LedgerError::Decode {
            column: column.to_string(),
            reason: e.to_string(),
        })
}

fn decode_timestamp_opt(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, LedgerError> {
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| {
        DateTime::parse_from_rfc3339(&t)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| LedgerError::Decode {
                column: column.to_string(),
                reason: e.to_string(),
            })
    })
    .transpose()
}

#[async_trait]
impl TradeLedger for SqliteTradeLedger {
    async fn record_buy(
        &self,
        level: i64,
        buy_order_id: OrderId,
        quantity: Decimal,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<RecordBuy, LedgerError> {
        let result = sqlx::query(
            "INSERT INTO trades (level, buy_order_id, buy_quantity, buy_price, buy_timestamp, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'OPEN')",
        )
        .bind(level)
        .bind(buy_order_id.value())
        .bind(quantity.to_string())
        .bind(price.to_string())
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                let row_id = done.last_insert_rowid();
                debug!(level, buy_order_id = %buy_order_id, row_id, "buy recorded");
                Ok(RecordBuy::Recorded(row_id))
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                warn!(buy_order_id = %buy_order_id, "buy order already recorded, skipping");
                Ok(RecordBuy::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn attach_sell(&self, row_id: i64, sell_order_id: OrderId) -> Result<(), LedgerError> {
        let done = sqlx::query("UPDATE trades SET sell_order_id = ?1 WHERE id = ?2")
            .bind(sell_order_id.value())
            .bind(row_id)
            .execute(&self.pool)
            .await?;

        if done.rows_affected() == 0 {
            return Err(LedgerError::RowNotFound(row_id));
        }
        debug!(row_id, sell_order_id = %sell_order_id, "sell attached");
        Ok(())
    }

    async fn close(
        &self,
        sell_order_id: OrderId,
        quantity: Decimal,
        price: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let done = sqlx::query(
            "UPDATE trades
             SET status = 'CLOSED', sell_quantity = ?1, sell_price = ?2, sell_timestamp = ?3
             WHERE sell_order_id = ?4 AND status = 'OPEN'",
        )
        .bind(quantity.to_string())
        .bind(price.map(|p| p.to_string()))
        .bind(at.to_rfc3339())
        .bind(sell_order_id.value())
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            // Duplicate delivery or an unknown sell: ignore.
            warn!(sell_order_id = %sell_order_id, "close matched no open trade, ignoring");
        } else {
            debug!(sell_order_id = %sell_order_id, "trade closed");
        }
        Ok(())
    }

    async fn list_open(&self) -> Result<Vec<TradeRow>, LedgerError> {
        let rows = sqlx::query("SELECT * FROM trades WHERE status = 'OPEN' ORDER BY level ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_trade).collect()
    }

    async fn find_by_sell_order(
        &self,
        sell_order_id: OrderId,
    ) -> Result<Option<TradeRow>, LedgerError> {
        let row = sqlx::query("SELECT * FROM trades WHERE sell_order_id = ?1")
            .bind(sell_order_id.value())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_trade).transpose()
    }
}
