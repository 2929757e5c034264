//! Simulated broker gateway.
//!
//! Returns acknowledged orders with sequential ids without touching a real
//! broker. Tests (and paper runs without a live session) script it: seed
//! open orders and position, inject fills, or enable auto-fill so plain
//! limit buys fill at their limit immediately.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::broadcast;

use super::{BrokerError, BrokerGateway, FillSubscription};
use crate::models::{
    FillEvent, OpenOrder, OrderAck, OrderId, OrderSide, OrderSpec, OrderStatus, OrderType,
    PositionReport,
};

const FILL_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Inner {
    open: Vec<OpenOrder>,
    statuses: HashMap<OrderId, OrderAck>,
    placed: Vec<(OrderId, OrderSpec)>,
    cancelled: Vec<OrderId>,
    position: Option<PositionReport>,
}

/// Simulated broker gateway with sequential order ids.
pub struct MockBrokerGateway {
    inner: Mutex<Inner>,
    next_id: AtomicI64,
    auto_fill: AtomicBool,
    fills: broadcast::Sender<FillEvent>,
}

impl Default for MockBrokerGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrokerGateway {
    /// Create a gateway with no position and no open orders.
    #[must_use]
    pub fn new() -> Self {
        let (fills, _) = broadcast::channel(FILL_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicI64::new(1),
            auto_fill: AtomicBool::new(false),
            fills,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Enable auto-fill: plain limit BUY orders fill at their limit price
    /// the moment they are placed. Conditional (limit-if-touched) buys and
    /// sells stay working.
    #[must_use]
    pub fn with_auto_fill(self) -> Self {
        self.auto_fill.store(true, Ordering::SeqCst);
        self
    }

    /// Seed a working order, as if it survived from a previous session.
    pub fn seed_open_order(&self, order: OpenOrder) {
        let mut inner = self.lock();
        inner.statuses.insert(
            order.order_id,
            OrderAck {
                order_id: order.order_id,
                status: OrderStatus::Accepted,
                filled_quantity: Decimal::ZERO,
                avg_fill_price: None,
            },
        );
        inner.open.push(order);
    }

    /// Set the reported position.
    pub fn set_position(&self, quantity: Decimal, average_cost: Decimal) {
        let mut inner = self.lock();
        inner.position = Some(PositionReport {
            quantity,
            average_cost,
        });
    }

    /// Override the status returned for an order id.
    pub fn set_order_status(&self, ack: OrderAck) {
        let mut inner = self.lock();
        inner.statuses.insert(ack.order_id, ack);
    }

    /// Inject a fill: the matching open order is removed and the event is
    /// broadcast to subscribers.
    pub fn push_fill(&self, event: FillEvent) {
        {
            let mut inner = self.lock();
            inner.open.retain(|o| o.order_id != event.order_id);
            inner.statuses.insert(
                event.order_id,
                OrderAck {
                    order_id: event.order_id,
                    status: OrderStatus::Filled,
                    filled_quantity: event.quantity,
                    avg_fill_price: Some(event.price),
                },
            );
        }
        // No receivers is fine: nothing is listening yet.
        let _ = self.fills.send(event);
    }

    /// Every order placed through the gateway, in order.
    #[must_use]
    pub fn placed_orders(&self) -> Vec<(OrderId, OrderSpec)> {
        self.lock().placed.clone()
    }

    /// Every cancellation requested through the gateway, in order.
    #[must_use]
    pub fn cancelled_orders(&self) -> Vec<OrderId> {
        self.lock().cancelled.clone()
    }

    /// The id the next placed order will receive.
    #[must_use]
    pub fn peek_next_order_id(&self) -> OrderId {
        OrderId::new(self.next_id.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl BrokerGateway for MockBrokerGateway {
    async fn connect(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn place_order(&self, spec: OrderSpec) -> Result<OrderAck, BrokerError> {
        let order_id = OrderId::new(self.next_id.fetch_add(1, Ordering::SeqCst));

        let auto_fill = self.auto_fill.load(Ordering::SeqCst)
            && spec.side == OrderSide::Buy
            && spec.order_type == OrderType::Limit;

        let ack = {
            let mut inner = self.lock();
            inner.placed.push((order_id, spec.clone()));

            let ack = if auto_fill {
                OrderAck {
                    order_id,
                    status: OrderStatus::Filled,
                    filled_quantity: spec.quantity,
                    avg_fill_price: Some(spec.limit_price),
                }
            } else {
                inner.open.push(OpenOrder {
                    order_id,
                    side: spec.side,
                    order_type: spec.order_type,
                    quantity: spec.quantity,
                    limit_price: spec.limit_price,
                    trigger_price: spec.trigger_price,
                });
                OrderAck {
                    order_id,
                    status: OrderStatus::Accepted,
                    filled_quantity: Decimal::ZERO,
                    avg_fill_price: None,
                }
            };
            inner.statuses.insert(order_id, ack.clone());
            ack
        };

        if auto_fill {
            let _ = self.fills.send(FillEvent {
                order_id,
                side: spec.side,
                quantity: spec.quantity,
                price: spec.limit_price,
                timestamp: Utc::now(),
            });
        }

        Ok(ack)
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<(), BrokerError> {
        let mut inner = self.lock();
        inner.cancelled.push(order_id);
        inner.open.retain(|o| o.order_id != order_id);
        if let Some(ack) = inner.statuses.get_mut(&order_id) {
            if !ack.status.is_terminal() {
                ack.status = OrderStatus::Cancelled;
            }
        }
        Ok(())
    }

    async fn order_status(&self, order_id: OrderId) -> Result<OrderAck, BrokerError> {
        let inner = self.lock();
        inner
            .statuses
            .get(&order_id)
            .cloned()
            .ok_or(BrokerError::OrderNotFound(order_id))
    }

    async fn open_orders(&self) -> Result<Vec<OpenOrder>, BrokerError> {
        let inner = self.lock();
        Ok(inner.open.clone())
    }

    async fn position(&self) -> Result<PositionReport, BrokerError> {
        let inner = self.lock();
        Ok(inner.position.unwrap_or(PositionReport::flat()))
    }

    fn subscribe_fills(&self) -> FillSubscription {
        FillSubscription::new(self.fills.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn sequential_ids_and_open_order_tracking() {
        let broker = MockBrokerGateway::new();
        let ack1 = broker
            .place_order(OrderSpec::limit("TQQQ", OrderSide::Buy, dec!(100), dec!(50)))
            .await
            .unwrap();
        let ack2 = broker
            .place_order(OrderSpec::conditional_buy("TQQQ", dec!(80), dec!(49.50)))
            .await
            .unwrap();

        assert_eq!(ack1.order_id, OrderId::new(1));
        assert_eq!(ack2.order_id, OrderId::new(2));
        assert_eq!(broker.open_orders().await.unwrap().len(), 2);

        broker.cancel_order(ack1.order_id).await.unwrap();
        let open = broker.open_orders().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].order_id, ack2.order_id);
    }

    #[tokio::test]
    async fn auto_fill_fills_plain_limit_buys_only() {
        let broker = MockBrokerGateway::new().with_auto_fill();
        let mut fills = broker.subscribe_fills();

        let buy = broker
            .place_order(OrderSpec::limit("TQQQ", OrderSide::Buy, dec!(100), dec!(50.13)))
            .await
            .unwrap();
        assert_eq!(buy.status, OrderStatus::Filled);

        let event = fills.recv().await.unwrap();
        assert_eq!(event.order_id, buy.order_id);
        assert_eq!(event.price, dec!(50.13));

        let sell = broker
            .place_order(OrderSpec::limit("TQQQ", OrderSide::Sell, dec!(100), dec!(50.50)))
            .await
            .unwrap();
        assert_eq!(sell.status, OrderStatus::Accepted);

        let lit = broker
            .place_order(OrderSpec::conditional_buy("TQQQ", dec!(80), dec!(49.50)))
            .await
            .unwrap();
        assert_eq!(lit.status, OrderStatus::Accepted);
    }

    #[tokio::test]
    async fn push_fill_removes_open_order_and_broadcasts() {
        let broker = MockBrokerGateway::new();
        let mut fills = broker.subscribe_fills();

        let ack = broker
            .place_order(OrderSpec::limit("TQQQ", OrderSide::Sell, dec!(100), dec!(50.50)))
            .await
            .unwrap();

        broker.push_fill(FillEvent {
            order_id: ack.order_id,
            side: OrderSide::Sell,
            quantity: dec!(100),
            price: dec!(50.50),
            timestamp: Utc::now(),
        });

        assert!(broker.open_orders().await.unwrap().is_empty());
        let event = fills.recv().await.unwrap();
        assert_eq!(event.order_id, ack.order_id);

        let status = broker.order_status(ack.order_id).await.unwrap();
        assert_eq!(status.status, OrderStatus::Filled);
    }
}
