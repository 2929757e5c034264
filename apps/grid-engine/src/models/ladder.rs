//! The ladder: the ordered level -> quantity table defining grid sizes.

use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors loading or validating the ladder file.
#[derive(Debug, Error)]
pub enum LadderError {
    /// The CSV file could not be read or parsed.
    #[error("failed to read ladder file: {0}")]
    Read(#[from] csv::Error),

    /// A row had a malformed level or quantity.
    #[error("malformed ladder row {row}: {reason}")]
    MalformedRow {
        /// 1-based row number.
        row: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Levels must be dense and start at 0.
    #[error("ladder levels must be dense from 0; row {row} declares level {level}")]
    NonDenseLevel {
        /// 1-based row number.
        row: usize,
        /// The level the row declared.
        level: i64,
    },

    /// The ladder file contained no rows.
    #[error("ladder file is empty")]
    Empty,
}

/// Immutable level -> quantity table, loaded once at startup.
///
/// Level `i` maps to `quantities[i]`; levels are dense from 0. Adjacent
/// levels may share a quantity; the inverse lookup therefore returns all
/// candidate levels and reconciliation disambiguates by price ordering.
#[derive(Debug, Clone)]
pub struct Ladder {
    quantities: Vec<Decimal>,
}

impl Ladder {
    /// Build a ladder from per-level quantities (level = index).
    ///
    /// # Errors
    ///
    /// Returns an error if the ladder is empty or a quantity is not
    /// positive.
    pub fn new(quantities: Vec<Decimal>) -> Result<Self, LadderError> {
        if quantities.is_empty() {
            return Err(LadderError::Empty);
        }
        for (level, qty) in quantities.iter().enumerate() {
            if *qty <= Decimal::ZERO {
                return Err(LadderError::MalformedRow {
                    row: level + 1,
                    reason: format!("quantity {qty} is not positive"),
                });
            }
        }
        Ok(Self { quantities })
    }

    /// Load the ladder from a headerless two-column CSV (level, quantity).
    ///
    /// # Errors
    ///
    /// Returns an error on IO/parse failure, non-dense levels, or any
    /// condition [`Ladder::new`] rejects. Malformed input is fatal at
    /// startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LadderError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut quantities = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let row = index + 1;

            let level: i64 = record
                .get(0)
                .ok_or_else(|| LadderError::MalformedRow {
                    row,
                    reason: "missing level column".to_string(),
                })?
                .parse()
                .map_err(|e| LadderError::MalformedRow {
                    row,
                    reason: format!("level: {e}"),
                })?;

            if level != index as i64 {
                return Err(LadderError::NonDenseLevel { row, level });
            }

            let quantity = record.get(1).ok_or_else(|| LadderError::MalformedRow {
                row,
                reason: "missing quantity column".to_string(),
            })?;
            let quantity = Decimal::from_str(quantity).map_err(|e| LadderError::MalformedRow {
                row,
                reason: format!("quantity: {e}"),
            })?;

            quantities.push(quantity);
        }

        Self::new(quantities)
    }

    /// Configured quantity for a level, or `None` once the ladder is
    /// exhausted (or for the orphan sentinel level).
    #[must_use]
    pub fn quantity_for(&self, level: i64) -> Option<Decimal> {
        if level < 0 {
            return None;
        }
        self.quantities.get(level as usize).copied()
    }

    /// Inverse lookup: every level whose configured quantity matches, in
    /// ascending order.
    ///
    /// Used by reconciliation to map an open sell order back to the level
    /// it protects.
    #[must_use]
    pub fn levels_for_quantity(&self, quantity: Decimal) -> Vec<i64> {
        self.quantities
            .iter()
            .enumerate()
            .filter(|(_, q)| **q == quantity)
            .map(|(i, _)| i as i64)
            .collect()
    }

    /// Number of levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    /// True if the ladder has no levels (never holds after construction).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }
}
