//! Mutable engine state: the lot inventory, the next ladder level, and
//! the buy reference price.
//!
//! The state object is owned by the engine coordinator and mutated only
//! inside lock-guarded transition functions; nothing touches it from
//! unsynchronized contexts.

use rust_decimal::Decimal;

use super::reconcile::ReconcileError;
use crate::ledger::TradeRow;
use crate::models::{Lot, OrderId, round_cents};

/// In-memory trading state, rebuilt from OPEN ledger rows at startup.
#[derive(Debug, Clone)]
pub struct EngineState {
    inventory: Vec<Lot>,
    /// Next ladder index to fill.
    pub next_level: i64,
    /// Anchor for computing the next buy trigger; `None` until level 0
    /// fills.
    pub buy_reference_price: Option<Decimal>,
}

impl EngineState {
    /// State with no open lots: ready for the level-0 bootstrap.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            inventory: Vec::new(),
            next_level: 0,
            buy_reference_price: None,
        }
    }

    /// Open lots, in insertion order.
    #[must_use]
    pub fn inventory(&self) -> &[Lot] {
        &self.inventory
    }

    /// Number of open lots.
    #[must_use]
    pub fn open_lot_count(&self) -> usize {
        self.inventory.len()
    }

    /// True if a lot already occupies this level.
    #[must_use]
    pub fn has_open_level(&self, level: i64) -> bool {
        self.inventory.iter().any(|lot| lot.level == level)
    }

    /// Add a lot to the inventory.
    pub fn push_lot(&mut self, lot: Lot) {
        self.inventory.push(lot);
    }

    /// Remove and return the lot paired with this sell order, if any.
    pub fn take_by_sell_order(&mut self, sell_order_id: OrderId) -> Option<Lot> {
        let index = self
            .inventory
            .iter()
            .position(|lot| lot.sell_order_id == Some(sell_order_id))?;
        Some(self.inventory.remove(index))
    }

    /// Rebuild state from the reconciled OPEN ledger rows.
    ///
    /// `next_level` becomes max open level + 1 (0 when nothing is open);
    /// the reference price is the level-0 purchase price compounded by
    /// the buy-trigger ratio once per already-filled level, rounded per
    /// step.
    ///
    /// # Errors
    ///
    /// Returns an error if two OPEN rows share a level, or if levels
    /// above 0 are open without a level-0 anchor to compound from.
    pub fn rebuild(
        rows: &[TradeRow],
        profit_target_ratio: Decimal,
        buy_trigger_ratio: Decimal,
    ) -> Result<Self, ReconcileError> {
        let inventory: Vec<Lot> = rows
            .iter()
            .map(|row| Lot::from_row(row, profit_target_ratio))
            .collect();

        for (index, lot) in inventory.iter().enumerate() {
            if inventory[..index].iter().any(|l| l.level == lot.level) {
                return Err(ReconcileError::DuplicateOpenLevel { level: lot.level });
            }
        }

        let Some(highest) = inventory.iter().max_by_key(|lot| lot.level) else {
            return Ok(Self::empty());
        };

        let next_level = highest.level + 1;
        let buy_reference_price = if highest.level > 0 {
            let anchor = inventory
                .iter()
                .find(|lot| lot.level == 0)
                .ok_or(ReconcileError::MissingLevelZero {
                    highest_level: highest.level,
                })?;
            let mut reference = anchor.purchase_price;
            for _ in 0..highest.level {
                reference = round_cents(reference * buy_trigger_ratio);
            }
            Some(reference)
        } else {
            Some(round_cents(highest.purchase_price))
        };

        Ok(Self {
            inventory,
            next_level,
            buy_reference_price,
        })
    }
}
