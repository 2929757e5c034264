//! The forward buy-queue manager.
//!
//! Keeps a fixed-depth rolling set of conditional buys working at the
//! next untriggered levels. A refresh cancels every open buy (minus an
//! optional exemption for an order that just filled), waits briefly for
//! the cancellations to settle, then places fresh trigger-equals-limit
//! orders for levels `next_level .. next_level + depth`.

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::GridEngine;
use super::state::EngineState;
use crate::models::{OrderId, OrderSide, OrderSpec, round_cents};

impl GridEngine {
    /// Rebuild the conditional buy queue from the current state.
    ///
    /// Failures are transient: they are logged and the next refresh (or
    /// the next startup reconciliation) repairs the queue.
    pub(crate) async fn refresh_buy_queue(&self, state: &EngineState, exempt: Option<OrderId>) {
        let open = match self.broker.open_orders().await {
            Ok(open) => open,
            Err(e) => {
                warn!(error = %e, "cannot list open orders, skipping queue refresh");
                return;
            }
        };

        let mut cancelled = 0_usize;
        for order in open.iter().filter(|o| o.side == OrderSide::Buy) {
            if Some(order.order_id) == exempt {
                debug!(order_id = %order.order_id, "skipping just-filled order");
                continue;
            }
            warn!(order_id = %order.order_id, "cancelling stale conditional buy");
            match self.broker.cancel_order(order.order_id).await {
                Ok(()) => cancelled += 1,
                Err(e) => warn!(order_id = %order.order_id, error = %e, "cancel failed"),
            }
        }

        if cancelled > 0 {
            // Give the broker a moment before re-quoting the same levels.
            tokio::time::sleep(self.strategy.cancel_settle()).await;
        }

        let Some(reference) = state.buy_reference_price else {
            if state.next_level == 0 {
                debug!("no reference price yet, buy queue stays empty until level 0 fills");
            } else {
                error!(
                    next_level = state.next_level,
                    "cannot queue conditional buys without a reference price"
                );
            }
            return;
        };
        if reference <= Decimal::ZERO {
            error!(reference = %reference, "invalid reference price, not placing buys");
            return;
        }

        // The running product stays unrounded; each placed trigger is
        // rounded to cents.
        let mut running = reference;
        for offset in 0..self.strategy.queue_depth {
            let level = state.next_level + offset as i64;
            let Some(quantity) = self.ladder.quantity_for(level) else {
                info!(level, "ladder exhausted, queue truncated");
                break;
            };

            running *= self.strategy.buy_trigger_ratio;
            let trigger = round_cents(running);

            match self
                .broker
                .place_order(OrderSpec::conditional_buy(
                    self.symbol.as_str(),
                    quantity,
                    trigger,
                ))
                .await
            {
                Ok(ack) => info!(
                    level,
                    order_id = %ack.order_id,
                    trigger = %trigger,
                    quantity = %quantity,
                    "conditional buy queued"
                ),
                Err(e) => warn!(
                    level,
                    error = %e,
                    "failed to place conditional buy, will retry at next refresh"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fills::tests::make_harness;
    use crate::broker::BrokerGateway;
    use crate::models::{OpenOrder, OrderSide, OrderType};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn refresh_cancels_existing_buys_and_replaces_at_depth() {
        let h = make_harness(false).await;
        // Two stale conditional buys survive from a previous queue.
        h.broker.seed_open_order(OpenOrder {
            order_id: crate::models::OrderId::new(901),
            side: OrderSide::Buy,
            order_type: OrderType::LimitIfTouched,
            quantity: dec!(100),
            limit_price: dec!(49.00),
            trigger_price: Some(dec!(49.00)),
        });
        h.broker.seed_open_order(OpenOrder {
            order_id: crate::models::OrderId::new(902),
            side: OrderSide::Buy,
            order_type: OrderType::LimitIfTouched,
            quantity: dec!(100),
            limit_price: dec!(48.00),
            trigger_price: Some(dec!(48.00)),
        });

        let mut state = crate::engine::EngineState::empty();
        state.next_level = 1;
        state.buy_reference_price = Some(dec!(50.00));

        h.engine.refresh_buy_queue(&state, None).await;

        let cancelled = h.broker.cancelled_orders();
        assert_eq!(cancelled.len(), 2);

        let open = h.broker.open_orders().await.unwrap();
        let buys: Vec<_> = open.iter().filter(|o| o.side == OrderSide::Buy).collect();
        assert_eq!(buys.len(), 3);
        let triggers: Vec<Decimal> = buys.iter().filter_map(|o| o.trigger_price).collect();
        assert_eq!(triggers, vec![dec!(49.50), dec!(49.01), dec!(48.51)]);
    }

    #[tokio::test]
    async fn refresh_preserves_exempt_order() {
        let h = make_harness(false).await;
        let exempt = crate::models::OrderId::new(901);
        h.broker.seed_open_order(OpenOrder {
            order_id: exempt,
            side: OrderSide::Buy,
            order_type: OrderType::LimitIfTouched,
            quantity: dec!(100),
            limit_price: dec!(49.00),
            trigger_price: Some(dec!(49.00)),
        });

        let mut state = crate::engine::EngineState::empty();
        state.next_level = 1;
        state.buy_reference_price = Some(dec!(50.00));

        h.engine.refresh_buy_queue(&state, Some(exempt)).await;
        assert!(h.broker.cancelled_orders().is_empty());
    }

    #[tokio::test]
    async fn refresh_stops_at_ladder_end() {
        let h = make_harness(false).await;

        // Ladder has 4 levels; from next_level 3 only one remains.
        let mut state = crate::engine::EngineState::empty();
        state.next_level = 3;
        state.buy_reference_price = Some(dec!(48.00));

        h.engine.refresh_buy_queue(&state, None).await;

        let open = h.broker.open_orders().await.unwrap();
        assert_eq!(open.len(), 1);
        // 48.00 * 0.99 = 47.52
        assert_eq!(open[0].trigger_price, Some(dec!(47.52)));
    }

    #[tokio::test]
    async fn refresh_without_reference_places_nothing() {
        let h = make_harness(false).await;
        let state = crate::engine::EngineState::empty();
        h.engine.refresh_buy_queue(&state, None).await;
        assert!(h.broker.open_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sells_are_never_cancelled_by_refresh() {
        let h = make_harness(false).await;
        h.broker.seed_open_order(OpenOrder {
            order_id: crate::models::OrderId::new(11),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            quantity: dec!(100),
            limit_price: dec!(50.50),
            trigger_price: None,
        });

        let mut state = crate::engine::EngineState::empty();
        state.next_level = 1;
        state.buy_reference_price = Some(dec!(50.00));

        h.engine.refresh_buy_queue(&state, None).await;
        assert!(h.broker.cancelled_orders().is_empty());
        let open = h.broker.open_orders().await.unwrap();
        assert!(open.iter().any(|o| o.side == OrderSide::Sell));
    }
}
