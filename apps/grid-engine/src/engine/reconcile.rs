//! Startup reconciliation: aligns the trade ledger with broker reality.
//!
//! Runs exactly once, before any new trigger is accepted. The broker's
//! open sell orders and reported position are the observations; the
//! ledger is repaired to explain them, and the in-memory state is then
//! rebuilt from the ledger alone. Anything the algorithm cannot explain
//! is fatal: the engine halts with an operator diagnostic rather than
//! guess.

use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use super::state::EngineState;
use crate::broker::{BrokerError, BrokerGateway};
use crate::config::StrategyConfig;
use crate::ledger::{LedgerError, RecordBuy, TradeLedger};
use crate::models::{Ladder, Lot, ORPHAN_LEVEL, OrderId, OrderSide, round_cents};

/// Irreconcilable or infrastructure failures during reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Broker call failed during startup.
    #[error("broker call failed: {0}")]
    Broker(#[from] BrokerError),

    /// Ledger call failed during startup.
    #[error("ledger call failed: {0}")]
    Ledger(#[from] LedgerError),

    /// An open sell order's quantity matches no free ladder level, so the
    /// lot it protects cannot be placed on the grid.
    #[error("open sell order {sell_order_id} has quantity {quantity} matching no free ladder level")]
    UnmappedQuantity {
        /// The unexplained sell order.
        sell_order_id: OrderId,
        /// Its quantity.
        quantity: Decimal,
    },

    /// An OPEN ledger row has no sell order id, so there is no way to
    /// tell whether its position is still protected.
    #[error("open ledger row {row_id} (level {level}) has no sell order attached")]
    UntrackedOpenRow {
        /// The ambiguous row.
        row_id: i64,
        /// Its level.
        level: i64,
    },

    /// The ledger claims more open quantity than the broker reports.
    #[error(
        "ledger claims {ledger_quantity} open but broker reports only {position}; \
         position is unexplained"
    )]
    NegativeOrphan {
        /// Broker-reported position quantity.
        position: Decimal,
        /// Sum of OPEN ledger quantities.
        ledger_quantity: Decimal,
    },

    /// Levels above 0 are open with no level-0 row to anchor the
    /// reference price.
    #[error("open lots up to level {highest_level} but no level-0 lot to anchor the reference price")]
    MissingLevelZero {
        /// Highest open level found.
        highest_level: i64,
    },

    /// Two OPEN rows occupy the same level.
    #[error("two open ledger rows occupy level {level}")]
    DuplicateOpenLevel {
        /// The doubly-occupied level.
        level: i64,
    },
}

impl ReconcileError {
    /// Operator-directed remediation text.
    #[must_use]
    pub fn remediation(&self) -> String {
        match self {
            Self::Broker(_) | Self::Ledger(_) => {
                "Transient infrastructure failure during startup; check connectivity \
                 and restart."
                    .to_string()
            }
            Self::UnmappedQuantity { sell_order_id, .. } => format!(
                "Inspect sell order {sell_order_id} at the broker. Either the ladder file \
                 changed since the order was placed, or the order was resized manually. \
                 Cancel or resize the order (or restore the ladder), then restart."
            ),
            Self::UntrackedOpenRow { row_id, .. } => format!(
                "Ledger row {row_id} is OPEN with no protective sell. Place the missing \
                 sell manually and attach its order id to the row, or close the row, \
                 then restart."
            ),
            Self::NegativeOrphan { .. } => {
                "The broker holds less stock than the ledger says is open. Shares were \
                 likely sold outside the engine; close the affected ledger rows manually, \
                 then restart."
                    .to_string()
            }
            Self::MissingLevelZero { .. } => {
                "Higher grid levels are open but the level-0 row is gone, so the next \
                 trigger cannot be computed. Repair the ledger (restore the level-0 row \
                 or close the higher rows), then restart."
                    .to_string()
            }
            Self::DuplicateOpenLevel { level } => format!(
                "Two OPEN ledger rows claim level {level}. Close the stale one, then \
                 restart."
            ),
        }
    }
}

/// One-shot startup reconciliation.
pub struct Reconciler<'a> {
    broker: &'a dyn BrokerGateway,
    ledger: &'a dyn TradeLedger,
    ladder: &'a Ladder,
    strategy: &'a StrategyConfig,
    symbol: &'a str,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler over the engine's collaborators.
    #[must_use]
    pub const fn new(
        broker: &'a dyn BrokerGateway,
        ledger: &'a dyn TradeLedger,
        ladder: &'a Ladder,
        strategy: &'a StrategyConfig,
        symbol: &'a str,
    ) -> Self {
        Self {
            broker,
            ledger,
            ladder,
            strategy,
            symbol,
        }
    }

    /// Run the full reconciliation and return the rebuilt state.
    ///
    /// # Errors
    ///
    /// Returns a [`ReconcileError`] on any broker/ledger failure or
    /// irreconcilable condition; the caller must halt, not retry.
    pub async fn run(&self) -> Result<EngineState, ReconcileError> {
        info!("starting ledger/broker reconciliation");

        // 1. Observe the broker: open sells and the reported position.
        let open_orders = self.broker.open_orders().await?;
        let open_sells: Vec<_> = open_orders
            .iter()
            .filter(|o| o.side == OrderSide::Sell)
            .collect();
        let position = self.broker.position().await?;

        info!(
            open_sells = open_sells.len(),
            position = %position.quantity,
            average_cost = %position.average_cost,
            "broker state fetched"
        );

        // 2. Every open sell the ledger does not know becomes a
        // synthesized OPEN row: invert the profit target to recover the
        // purchase price, map quantity back to a level. Adjacent levels
        // may share a quantity, so untracked sells are assigned highest
        // limit first (level 0 was bought highest) to the lowest free
        // matching level.
        let mut untracked = Vec::new();
        for sell in &open_sells {
            if self.ledger.find_by_sell_order(sell.order_id).await?.is_none() {
                untracked.push((*sell).clone());
            }
        }
        untracked.sort_by(|a, b| b.limit_price.cmp(&a.limit_price));

        let mut used_levels: HashSet<i64> = self
            .ledger
            .list_open()
            .await?
            .iter()
            .map(|row| row.level)
            .collect();

        for sell in untracked {
            let level = self
                .ladder
                .levels_for_quantity(sell.quantity)
                .into_iter()
                .find(|level| !used_levels.contains(level))
                .ok_or(ReconcileError::UnmappedQuantity {
                    sell_order_id: sell.order_id,
                    quantity: sell.quantity,
                })?;
            used_levels.insert(level);

            let implied_price = round_cents(sell.limit_price / self.strategy.profit_target_ratio);
            info!(
                sell_order_id = %sell.order_id,
                level,
                implied_price = %implied_price,
                "re-creating ledger row for untracked open sell"
            );

            let outcome = self
                .ledger
                .record_buy(
                    level,
                    sell.order_id.synthetic(),
                    sell.quantity,
                    implied_price,
                    Utc::now(),
                )
                .await?;
            if let RecordBuy::Recorded(row_id) = outcome {
                self.ledger.attach_sell(row_id, sell.order_id).await?;
            }
        }

        // 3. OPEN rows whose sell is no longer working were filled while
        // offline: close them now, amount unknown.
        let open_sell_ids: HashSet<OrderId> = open_sells.iter().map(|o| o.order_id).collect();
        for row in self.ledger.list_open().await? {
            let sell_order_id = row.sell_order_id.ok_or(ReconcileError::UntrackedOpenRow {
                row_id: row.id,
                level: row.level,
            })?;

            if !open_sell_ids.contains(&sell_order_id) {
                warn!(
                    row_id = row.id,
                    level = row.level,
                    sell_order_id = %sell_order_id,
                    "sell filled while offline; closing with unknown sale amount"
                );
                self.ledger
                    .close(sell_order_id, row.buy_quantity, None, Utc::now())
                    .await?;
            }
        }

        // 4. Position the surviving rows cannot explain becomes one
        // orphan lot at the sentinel level, protected immediately.
        let open_rows = self.ledger.list_open().await?;
        let ledger_quantity: Decimal = open_rows.iter().map(|r| r.buy_quantity).sum();
        let orphan_quantity = position.quantity - ledger_quantity;

        if orphan_quantity > self.strategy.orphan_tolerance {
            self.adopt_orphan(orphan_quantity, position.average_cost)
                .await?;
        } else if orphan_quantity < -self.strategy.orphan_tolerance {
            return Err(ReconcileError::NegativeOrphan {
                position: position.quantity,
                ledger_quantity,
            });
        }

        // 5-7. Rebuild in-memory state from the now-consistent ledger.
        let rows = self.ledger.list_open().await?;
        let state = EngineState::rebuild(
            &rows,
            self.strategy.profit_target_ratio,
            self.strategy.buy_trigger_ratio,
        )?;

        info!(
            open_lots = state.open_lot_count(),
            next_level = state.next_level,
            reference_price = ?state.buy_reference_price,
            "reconciliation complete"
        );

        Ok(state)
    }

    /// Record and protect an orphan lot priced at the broker's average
    /// cost.
    async fn adopt_orphan(
        &self,
        quantity: Decimal,
        average_cost: Decimal,
    ) -> Result<(), ReconcileError> {
        let price = round_cents(average_cost);
        warn!(
            quantity = %quantity,
            average_cost = %price,
            "orphan position detected; adopting at sentinel level"
        );

        let synthetic_id = OrderId::new(-Utc::now().timestamp());
        let outcome = self
            .ledger
            .record_buy(ORPHAN_LEVEL, synthetic_id, quantity, price, Utc::now())
            .await?;
        let RecordBuy::Recorded(row_id) = outcome else {
            warn!(buy_order_id = %synthetic_id, "orphan row already recorded, skipping");
            return Ok(());
        };

        let lot = Lot::new(
            ORPHAN_LEVEL,
            quantity,
            price,
            self.strategy.profit_target_ratio,
            row_id,
        );
        let ack = self
            .broker
            .place_order(lot.protective_sell_spec(self.symbol))
            .await?;
        self.ledger.attach_sell(row_id, ack.order_id).await?;

        info!(
            row_id,
            sell_order_id = %ack.order_id,
            target = %lot.sell_target_price,
            "protective sell placed for orphan lot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerGateway;
    use crate::ledger::{SqliteTradeLedger, TradeStatus};
    use crate::models::{OpenOrder, OrderType};
    use rust_decimal_macros::dec;

    fn make_ladder() -> Ladder {
        Ladder::new(vec![dec!(100), dec!(80), dec!(50)]).unwrap()
    }

    fn make_sell(id: i64, quantity: Decimal, limit: Decimal) -> OpenOrder {
        OpenOrder {
            order_id: OrderId::new(id),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            quantity,
            limit_price: limit,
            trigger_price: None,
        }
    }

    async fn run_reconciler(
        broker: &MockBrokerGateway,
        ledger: &SqliteTradeLedger,
        ladder: &Ladder,
    ) -> Result<EngineState, ReconcileError> {
        let strategy = StrategyConfig::default();
        Reconciler::new(broker, ledger, ladder, &strategy, "TQQQ")
            .run()
            .await
    }

    #[tokio::test]
    async fn clean_start_yields_empty_state() {
        let broker = MockBrokerGateway::new();
        let ledger = SqliteTradeLedger::open_in_memory().await.unwrap();
        let ladder = make_ladder();

        let state = run_reconciler(&broker, &ledger, &ladder).await.unwrap();
        assert_eq!(state.next_level, 0);
        assert!(state.buy_reference_price.is_none());
        assert_eq!(state.open_lot_count(), 0);
    }

    #[tokio::test]
    async fn recreates_rows_for_untracked_open_sells() {
        let broker = MockBrokerGateway::new();
        // Two protective sells survive from a previous life; ledger is empty.
        broker.seed_open_order(make_sell(11, dec!(100), dec!(50.50)));
        broker.seed_open_order(make_sell(12, dec!(80), dec!(50.00)));
        broker.set_position(dec!(180), dec!(49.75));

        let ledger = SqliteTradeLedger::open_in_memory().await.unwrap();
        let ladder = make_ladder();

        let state = run_reconciler(&broker, &ledger, &ladder).await.unwrap();

        // 50.50 / 1.01 = 50.00 and 50.00 / 1.01 = 49.5049.. -> 49.50
        let open = ledger.list_open().await.unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].level, 0);
        assert_eq!(open[0].buy_price, dec!(50.00));
        assert_eq!(open[0].buy_order_id, OrderId::new(-11));
        assert_eq!(open[0].sell_order_id, Some(OrderId::new(11)));
        assert_eq!(open[1].level, 1);
        assert_eq!(open[1].buy_price, dec!(49.50));

        assert_eq!(state.next_level, 2);
        assert_eq!(state.open_lot_count(), 2);
        // Reference compounds from the implied level-0 price: 50.00 -> 49.50.
        assert_eq!(state.buy_reference_price, Some(dec!(49.50)));
    }

    #[tokio::test]
    async fn duplicate_quantity_levels_assigned_by_price_order() {
        let broker = MockBrokerGateway::new();
        // Levels 0 and 1 both buy 100 shares; the dearer sell belongs to
        // the shallower level.
        broker.seed_open_order(make_sell(12, dec!(100), dec!(50.00)));
        broker.seed_open_order(make_sell(11, dec!(100), dec!(50.50)));
        broker.set_position(dec!(200), dec!(49.75));

        let ledger = SqliteTradeLedger::open_in_memory().await.unwrap();
        let ladder = Ladder::new(vec![dec!(100), dec!(100), dec!(50)]).unwrap();

        let state = run_reconciler(&broker, &ledger, &ladder).await.unwrap();

        let open = ledger.list_open().await.unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].level, 0);
        assert_eq!(open[0].sell_order_id, Some(OrderId::new(11)));
        assert_eq!(open[1].level, 1);
        assert_eq!(open[1].sell_order_id, Some(OrderId::new(12)));
        assert_eq!(state.next_level, 2);
    }

    #[tokio::test]
    async fn closes_rows_whose_sell_disappeared() {
        let broker = MockBrokerGateway::new();
        broker.set_position(dec!(100), dec!(50.00));
        // Only the level-0 sell is still working.
        broker.seed_open_order(make_sell(11, dec!(100), dec!(50.50)));

        let ledger = SqliteTradeLedger::open_in_memory().await.unwrap();
        let RecordBuy::Recorded(row0) = ledger
            .record_buy(0, OrderId::new(1), dec!(100), dec!(50.00), Utc::now())
            .await
            .unwrap()
        else {
            panic!("expected Recorded");
        };
        ledger.attach_sell(row0, OrderId::new(11)).await.unwrap();

        // Level 1 was sold while the engine was offline.
        let RecordBuy::Recorded(row1) = ledger
            .record_buy(1, OrderId::new(2), dec!(80), dec!(49.50), Utc::now())
            .await
            .unwrap()
        else {
            panic!("expected Recorded");
        };
        ledger.attach_sell(row1, OrderId::new(12)).await.unwrap();

        let ladder = make_ladder();
        let state = run_reconciler(&broker, &ledger, &ladder).await.unwrap();

        assert_eq!(state.open_lot_count(), 1);
        assert_eq!(state.next_level, 1);

        let closed = ledger
            .find_by_sell_order(OrderId::new(12))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.status, TradeStatus::Closed);
        // Amount-unknown closure: quantity copied from the buy, price NULL.
        assert_eq!(closed.sell_quantity, Some(dec!(80)));
        assert_eq!(closed.sell_price, None);
    }

    #[tokio::test]
    async fn orphan_position_gets_sentinel_lot_and_sell() {
        let broker = MockBrokerGateway::new();
        broker.seed_open_order(make_sell(11, dec!(100), dec!(50.50)));
        // Broker holds 140 but the ledger will only explain 100.
        broker.set_position(dec!(140), dec!(49.80));

        let ledger = SqliteTradeLedger::open_in_memory().await.unwrap();
        let ladder = make_ladder();

        let state = run_reconciler(&broker, &ledger, &ladder).await.unwrap();

        let open = ledger.list_open().await.unwrap();
        assert_eq!(open.len(), 2);
        let orphan = open.iter().find(|r| r.level == ORPHAN_LEVEL).unwrap();
        assert_eq!(orphan.buy_quantity, dec!(40));
        assert_eq!(orphan.buy_price, dec!(49.80));
        assert!(orphan.sell_order_id.is_some());

        // The protective sell was actually placed: 49.80 * 1.01 = 50.298 -> 50.30.
        let placed = broker.placed_orders();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].1.side, OrderSide::Sell);
        assert_eq!(placed[0].1.quantity, dec!(40));
        assert_eq!(placed[0].1.limit_price, dec!(50.30));

        assert_eq!(state.open_lot_count(), 2);
        assert_eq!(state.next_level, 1);
    }

    #[tokio::test]
    async fn within_tolerance_divergence_is_ignored() {
        let broker = MockBrokerGateway::new();
        broker.seed_open_order(make_sell(11, dec!(100), dec!(50.50)));
        broker.set_position(dec!(100.05), dec!(50.00));

        let ledger = SqliteTradeLedger::open_in_memory().await.unwrap();
        let ladder = make_ladder();

        let state = run_reconciler(&broker, &ledger, &ladder).await.unwrap();
        assert_eq!(state.open_lot_count(), 1);
        assert!(broker.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn unmapped_sell_quantity_is_fatal() {
        let broker = MockBrokerGateway::new();
        broker.seed_open_order(make_sell(11, dec!(33), dec!(50.50)));

        let ledger = SqliteTradeLedger::open_in_memory().await.unwrap();
        let ladder = make_ladder();

        let err = run_reconciler(&broker, &ledger, &ladder).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::UnmappedQuantity { quantity, .. } if quantity == dec!(33)
        ));
        assert!(!err.remediation().is_empty());
    }

    #[tokio::test]
    async fn negative_orphan_is_fatal() {
        let broker = MockBrokerGateway::new();
        broker.seed_open_order(make_sell(11, dec!(100), dec!(50.50)));
        broker.set_position(dec!(20), dec!(50.00));

        let ledger = SqliteTradeLedger::open_in_memory().await.unwrap();
        let ladder = make_ladder();

        let err = run_reconciler(&broker, &ledger, &ladder).await.unwrap_err();
        assert!(matches!(err, ReconcileError::NegativeOrphan { .. }));
    }

    #[tokio::test]
    async fn untracked_open_row_is_fatal() {
        let broker = MockBrokerGateway::new();
        broker.set_position(dec!(100), dec!(50.00));

        let ledger = SqliteTradeLedger::open_in_memory().await.unwrap();
        // OPEN row that never got its sell attached.
        ledger
            .record_buy(0, OrderId::new(1), dec!(100), dec!(50.00), Utc::now())
            .await
            .unwrap();

        let ladder = make_ladder();
        let err = run_reconciler(&broker, &ledger, &ladder).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::UntrackedOpenRow { level: 0, .. }
        ));
    }

    #[tokio::test]
    async fn rerunning_reconciliation_is_idempotent() {
        let broker = MockBrokerGateway::new();
        broker.seed_open_order(make_sell(11, dec!(100), dec!(50.50)));
        broker.set_position(dec!(100), dec!(50.00));

        let ledger = SqliteTradeLedger::open_in_memory().await.unwrap();
        let ladder = make_ladder();

        let first = run_reconciler(&broker, &ledger, &ladder).await.unwrap();
        let second = run_reconciler(&broker, &ledger, &ladder).await.unwrap();

        assert_eq!(first.open_lot_count(), second.open_lot_count());
        assert_eq!(ledger.list_open().await.unwrap().len(), 1);
    }
}
