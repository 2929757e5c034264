//! The fill-driven state machine.
//!
//! Per-lot lifecycle: PENDING_BUY -> OPEN -> CLOSED, terminal, never
//! skipped or reopened. All fill handling is serialized through the
//! engine's state lock so ledger writes, inventory mutation, and
//! dependent order placement for one fill are atomic with respect to any
//! other fill.

use tracing::{error, info, warn};

use super::GridEngine;
use super::state::EngineState;
use crate::ledger::RecordBuy;
use crate::models::{FillEvent, Lot, OrderSide, round_cents};

impl GridEngine {
    /// Process one fill event from the broker stream.
    pub async fn on_fill(&self, event: FillEvent) {
        let mut state = self.state.lock().await;
        info!(
            order_id = %event.order_id,
            side = ?event.side,
            quantity = %event.quantity,
            price = %event.price,
            "fill received"
        );

        match event.side {
            OrderSide::Buy => self.handle_buy_fill(&mut state, event).await,
            OrderSide::Sell => self.handle_sell_fill(&mut state, event).await,
        }
    }

    /// A buy fill opens the lot at the current next level, places its
    /// protective sell, and advances the grid.
    async fn handle_buy_fill(&self, state: &mut EngineState, event: FillEvent) {
        let level = state.next_level;

        if state.has_open_level(level) {
            warn!(level, order_id = %event.order_id, "level already open, discarding buy fill");
            return;
        }

        // The ledger write comes first: if it cannot record the buy, no
        // downstream order may be placed.
        let row_id = match self
            .ledger
            .record_buy(level, event.order_id, event.quantity, event.price, event.timestamp)
            .await
        {
            Ok(RecordBuy::Recorded(row_id)) => row_id,
            Ok(RecordBuy::Duplicate) => {
                warn!(order_id = %event.order_id, "buy already recorded, discarding fill");
                return;
            }
            Err(e) => {
                error!(
                    order_id = %event.order_id,
                    error = %e,
                    "failed to record buy; aborting all handling for this fill"
                );
                return;
            }
        };

        let mut lot = Lot::new(
            level,
            event.quantity,
            event.price,
            self.strategy.profit_target_ratio,
            row_id,
        );

        match self
            .broker
            .place_order(lot.protective_sell_spec(&self.symbol))
            .await
        {
            Ok(ack) => {
                info!(
                    level,
                    sell_order_id = %ack.order_id,
                    target = %lot.sell_target_price,
                    "protective sell placed"
                );
                lot.sell_order_id = Some(ack.order_id);
                if let Err(e) = self.ledger.attach_sell(row_id, ack.order_id).await {
                    // The sell is already working; never unwind it.
                    error!(
                        row_id,
                        sell_order_id = %ack.order_id,
                        error = %e,
                        "failed to attach sell order to ledger row"
                    );
                }
            }
            Err(e) => {
                error!(
                    level,
                    row_id,
                    error = %e,
                    "failed to place protective sell; lot is unprotected until manual repair"
                );
            }
        }

        state.push_lot(lot);
        self.persist_snapshot(state).await;

        state.buy_reference_price = if level == 0 {
            Some(round_cents(event.price))
        } else if let Some(reference) = state.buy_reference_price {
            Some(round_cents(reference * self.strategy.buy_trigger_ratio))
        } else {
            warn!(level, "no reference price to compound after non-zero level fill");
            None
        };
        state.next_level = level + 1;

        info!(
            next_level = state.next_level,
            reference_price = ?state.buy_reference_price,
            "grid advanced"
        );

        self.refresh_buy_queue(state, Some(event.order_id)).await;
    }

    /// A sell fill closes the paired lot.
    async fn handle_sell_fill(&self, state: &mut EngineState, event: FillEvent) {
        let Some(lot) = state.take_by_sell_order(event.order_id) else {
            warn!(order_id = %event.order_id, "sell fill matches no open lot, ignoring");
            return;
        };

        self.persist_snapshot(state).await;

        if let Err(e) = self
            .ledger
            .close(event.order_id, event.quantity, Some(event.price), event.timestamp)
            .await
        {
            error!(order_id = %event.order_id, error = %e, "failed to close ledger row");
        }

        info!(
            level = lot.level,
            quantity = %event.quantity,
            price = %event.price,
            "lot closed"
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::broker::{BrokerGateway, MockBrokerGateway};
    use crate::config::Config;
    use crate::ledger::{SqliteTradeLedger, TradeLedger, TradeStatus};
    use crate::models::{Ladder, OrderId, OrderType};
    use crate::price::MockPriceSource;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    pub(crate) struct Harness {
        pub engine: Arc<GridEngine>,
        pub broker: Arc<MockBrokerGateway>,
        pub ledger: Arc<SqliteTradeLedger>,
        pub prices: Arc<MockPriceSource>,
        _dir: tempfile::TempDir,
    }

    pub(crate) async fn make_harness(auto_fill: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.persistence.snapshot_path = dir
            .path()
            .join("state.json")
            .to_string_lossy()
            .into_owned();

        let broker = if auto_fill {
            Arc::new(MockBrokerGateway::new().with_auto_fill())
        } else {
            Arc::new(MockBrokerGateway::new())
        };
        let ledger = Arc::new(SqliteTradeLedger::open_in_memory().await.unwrap());
        let prices = Arc::new(MockPriceSource::new());

        let ladder = Ladder::new(vec![dec!(100), dec!(100), dec!(50), dec!(40)]).unwrap();
        let engine = Arc::new(GridEngine::new(
            &config,
            ladder,
            broker.clone() as Arc<dyn BrokerGateway>,
            ledger.clone() as Arc<dyn TradeLedger>,
            prices.clone() as Arc<dyn crate::price::PriceSource>,
        ));

        Harness {
            engine,
            broker,
            ledger,
            prices,
            _dir: dir,
        }
    }

    fn buy_fill(id: i64, quantity: Decimal, price: Decimal) -> FillEvent {
        FillEvent {
            order_id: OrderId::new(id),
            side: OrderSide::Buy,
            quantity,
            price,
            timestamp: Utc::now(),
        }
    }

    fn sell_fill(id: i64, quantity: Decimal, price: Decimal) -> FillEvent {
        FillEvent {
            order_id: OrderId::new(id),
            side: OrderSide::Sell,
            quantity,
            price,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn buy_fill_opens_lot_and_places_sell() {
        let h = make_harness(false).await;

        h.engine.on_fill(buy_fill(1, dec!(100), dec!(50.00))).await;

        let state = h.engine.current_state().await;
        assert_eq!(state.next_level, 1);
        assert_eq!(state.buy_reference_price, Some(dec!(50.00)));
        assert_eq!(state.open_lot_count(), 1);
        assert_eq!(state.inventory()[0].sell_target_price, dec!(50.50));

        let sells: Vec<_> = h
            .broker
            .placed_orders()
            .into_iter()
            .filter(|(_, s)| s.side == OrderSide::Sell)
            .collect();
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].1.limit_price, dec!(50.50));
        assert_eq!(sells[0].1.quantity, dec!(100));

        let rows = h.ledger.list_open().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sell_order_id, Some(sells[0].0));
    }

    #[tokio::test]
    async fn duplicate_buy_fill_yields_one_lot_and_one_row() {
        let h = make_harness(false).await;

        let event = buy_fill(1, dec!(100), dec!(50.00));
        h.engine.on_fill(event.clone()).await;
        h.engine.on_fill(event).await;

        let state = h.engine.current_state().await;
        assert_eq!(state.open_lot_count(), 1);
        assert_eq!(state.next_level, 1);
        assert_eq!(h.ledger.list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn redelivered_buy_fill_after_level_advance_hits_ledger_guard() {
        let h = make_harness(false).await;

        h.engine.on_fill(buy_fill(1, dec!(100), dec!(50.00))).await;
        // The same order id arrives again after next_level moved to 1;
        // the level guard no longer matches, so the ledger de-dup must
        // catch it.
        h.engine.on_fill(buy_fill(1, dec!(100), dec!(50.00))).await;

        let state = h.engine.current_state().await;
        assert_eq!(state.open_lot_count(), 1);
        assert_eq!(state.next_level, 1);
        assert_eq!(h.ledger.list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reference_price_compounds_per_fill() {
        let h = make_harness(false).await;

        h.engine.on_fill(buy_fill(1, dec!(100), dec!(50.00))).await;
        h.engine.on_fill(buy_fill(2, dec!(100), dec!(49.50))).await;
        h.engine.on_fill(buy_fill(3, dec!(50), dec!(49.00))).await;

        let state = h.engine.current_state().await;
        assert_eq!(state.next_level, 3);
        // 50.00 -> 49.50 -> 49.01, rounded per step.
        assert_eq!(state.buy_reference_price, Some(dec!(49.01)));
    }

    #[tokio::test]
    async fn sell_fill_closes_lot_and_ledger_row() {
        let h = make_harness(false).await;

        h.engine.on_fill(buy_fill(1, dec!(100), dec!(50.00))).await;
        let state = h.engine.current_state().await;
        let sell_id = state.inventory()[0].sell_order_id.unwrap();

        h.engine.on_fill(sell_fill(sell_id.value(), dec!(100), dec!(50.50))).await;

        let state = h.engine.current_state().await;
        assert_eq!(state.open_lot_count(), 0);

        let row = h.ledger.find_by_sell_order(sell_id).await.unwrap().unwrap();
        assert_eq!(row.status, TradeStatus::Closed);
        assert_eq!(row.sell_price, Some(dec!(50.50)));

        // Redelivery: no lot matches any more, nothing changes.
        h.engine.on_fill(sell_fill(sell_id.value(), dec!(100), dec!(50.50))).await;
        assert_eq!(h.engine.current_state().await.open_lot_count(), 0);
    }

    #[tokio::test]
    async fn unknown_sell_fill_is_ignored() {
        let h = make_harness(false).await;
        h.engine.on_fill(sell_fill(404, dec!(100), dec!(50.50))).await;
        assert_eq!(h.engine.current_state().await.open_lot_count(), 0);
    }

    #[tokio::test]
    async fn queue_refresh_after_fill_respects_depth_and_exemption() {
        let h = make_harness(false).await;

        h.engine.on_fill(buy_fill(1, dec!(100), dec!(50.00))).await;

        let open = h.broker.open_orders().await.unwrap();
        let buys: Vec<_> = open
            .iter()
            .filter(|o| o.side == OrderSide::Buy)
            .collect();
        // Depth 3: levels 1..=3 queued at compounded triggers.
        assert_eq!(buys.len(), 3);
        let triggers: Vec<Decimal> = buys.iter().filter_map(|o| o.trigger_price).collect();
        assert_eq!(triggers, vec![dec!(49.50), dec!(49.01), dec!(48.51)]);
        assert!(buys.iter().all(|o| o.order_type == OrderType::LimitIfTouched));
    }
}
