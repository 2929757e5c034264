//! Write-only diagnostic snapshot store.
//!
//! Dumps the in-memory inventory to a JSON file for operator visibility
//! and crash forensics. The snapshot is never read back: the trade ledger
//! is the sole source of truth, and a failed write must never stop
//! trading.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineState;
use crate::models::Lot;

/// Errors writing a snapshot. Callers log these and carry on.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Serialization failed.
    #[error("snapshot serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Write failed.
    #[error("snapshot write error: {0}")]
    Write(#[from] std::io::Error),
}

/// The JSON document written on every state change.
#[derive(Debug, Serialize)]
struct SnapshotDocument<'a> {
    written_at: DateTime<Utc>,
    next_level: i64,
    buy_reference_price: Option<Decimal>,
    open_lots: &'a [Lot],
}

/// Writes diagnostic state dumps to a fixed path.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Create a store writing to `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Dump the current engine state.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub async fn write(&self, state: &EngineState) -> Result<(), SnapshotError> {
        let document = SnapshotDocument {
            written_at: Utc::now(),
            next_level: state.next_level,
            buy_reference_price: state.buy_reference_price,
            open_lots: state.inventory(),
        };

        let json = serde_json::to_vec_pretty(&document)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
