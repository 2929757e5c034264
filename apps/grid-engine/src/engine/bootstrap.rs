//! Level-0 bootstrap: the very first buy of a fresh grid.
//!
//! With no reference price to ladder from, the engine buys level 0 at a
//! marketable limit (market price times a small buffer) and polls the
//! order to a terminal state. A timed-out order is cancelled and the
//! bootstrap retries on a later price tick. A re-entrancy flag prevents
//! overlapping attempts.

use std::sync::atomic::Ordering;

use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::GridEngine;
use crate::broker::BrokerError;
use crate::models::{OrderAck, OrderId, OrderSide, OrderSpec, OrderStatus, round_cents};

/// How a monitored order ended.
#[derive(Debug)]
pub(crate) enum MonitorOutcome {
    /// Filled in full.
    Filled(OrderAck),
    /// Reached a terminal state other than filled.
    Terminal(OrderAck),
    /// Timed out and was cancelled.
    TimedOut(OrderId),
}

impl GridEngine {
    /// Attempt the level-0 buy if the grid is empty and no attempt is in
    /// flight. Called from the poll loop on every cycle.
    pub async fn try_bootstrap(&self) {
        if self.l0_in_flight.load(Ordering::SeqCst) {
            return;
        }
        {
            let state = self.state.lock().await;
            if state.next_level != 0 {
                return;
            }
        }

        let price = match self.prices.latest_price(&self.symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(error = %e, "no price for level-0 buy, will retry");
                return;
            }
        };
        if price <= Decimal::ZERO {
            warn!(price = %price, "ignoring non-positive price tick");
            return;
        }

        if self.l0_in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        self.execute_level0_buy(price).await;
    }

    /// Place and monitor the level-0 buy. Holds the state lock for the
    /// whole attempt so no fill can interleave with it.
    async fn execute_level0_buy(&self, market_price: Decimal) {
        let state = self.state.lock().await;
        if state.next_level != 0 {
            warn!("level 0 filled while waiting for the lock, aborting bootstrap");
            self.l0_in_flight.store(false, Ordering::SeqCst);
            return;
        }

        let Some(quantity) = self.ladder.quantity_for(0) else {
            error!("ladder has no level 0, cannot bootstrap");
            self.l0_in_flight.store(false, Ordering::SeqCst);
            return;
        };

        let limit = round_cents(market_price * self.strategy.l0_buffer_ratio);
        info!(
            market = %market_price,
            limit = %limit,
            quantity = %quantity,
            "placing level-0 buy"
        );

        let spec = OrderSpec::limit(self.symbol.as_str(), OrderSide::Buy, quantity, limit)
            .with_outside_rth();

        match self.place_and_monitor(spec).await {
            Ok(MonitorOutcome::Filled(ack)) => {
                // The buy-fill handler advances the grid from here; the
                // flag stays set since level 0 is no longer pending.
                info!(order_id = %ack.order_id, "level-0 buy filled");
            }
            Ok(MonitorOutcome::Terminal(ack)) => {
                warn!(
                    order_id = %ack.order_id,
                    status = ?ack.status,
                    "level-0 buy ended unfilled, will retry"
                );
                self.l0_in_flight.store(false, Ordering::SeqCst);
            }
            Ok(MonitorOutcome::TimedOut(order_id)) => {
                warn!(order_id = %order_id, "level-0 buy timed out, cancelled, will retry");
                self.l0_in_flight.store(false, Ordering::SeqCst);
            }
            Err(e) => {
                error!(error = %e, "level-0 buy failed, will retry");
                self.l0_in_flight.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Place an order and poll its status until a terminal state or the
    /// configured timeout (timeout cancels the order).
    async fn place_and_monitor(&self, spec: OrderSpec) -> Result<MonitorOutcome, BrokerError> {
        let ack = self.broker.place_order(spec).await?;
        if ack.status == OrderStatus::Filled {
            return Ok(MonitorOutcome::Filled(ack));
        }
        if ack.status.is_terminal() {
            return Ok(MonitorOutcome::Terminal(ack));
        }

        let started = Instant::now();
        loop {
            tokio::time::sleep(self.strategy.status_poll()).await;

            let status = self.broker.order_status(ack.order_id).await?;
            if status.status == OrderStatus::Filled {
                return Ok(MonitorOutcome::Filled(status));
            }
            if status.status.is_terminal() {
                return Ok(MonitorOutcome::Terminal(status));
            }

            if started.elapsed() >= self.strategy.order_timeout() {
                warn!(order_id = %ack.order_id, "order timed out, cancelling");
                self.broker.cancel_order(ack.order_id).await?;
                return Ok(MonitorOutcome::TimedOut(ack.order_id));
            }
            debug!(order_id = %ack.order_id, status = ?status.status, "order pending");
        }
    }
}
