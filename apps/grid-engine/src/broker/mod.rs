//! Broker gateway port.
//!
//! The engine is purely an orchestrating client: order placement,
//! cancellation, status, open orders, position, and the fill stream all
//! go through this port. Session management (connect/reconnect,
//! qualification) belongs to the adapter behind it.

mod mock;

pub use mock::MockBrokerGateway;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

use crate::models::{FillEvent, OpenOrder, OrderAck, OrderId, OrderSpec, PositionReport};

/// Errors from broker operations.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Connection or transport failure.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// Order rejected at submission.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Order not found.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Any other broker-side failure.
    #[error("broker error: {0}")]
    Other(String),
}

/// Subscription handle for the broker's fill stream.
///
/// Dropping the handle tears the subscription down; there are no dangling
/// handlers after disconnect.
pub struct FillSubscription {
    receiver: broadcast::Receiver<FillEvent>,
}

impl FillSubscription {
    /// Wrap a broadcast receiver.
    #[must_use]
    pub const fn new(receiver: broadcast::Receiver<FillEvent>) -> Self {
        Self { receiver }
    }

    /// Receive the next fill event.
    ///
    /// Returns `None` once the stream is closed. Lagged deliveries are
    /// logged and skipped; reconciliation at the next startup covers
    /// anything missed.
    pub async fn recv(&mut self) -> Option<FillEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "fill stream lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Port for broker interactions.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Establish the session and qualify the traded instrument.
    ///
    /// Must succeed before any other call; failure aborts startup.
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Place an order; resolves once the broker acknowledges submission.
    async fn place_order(&self, spec: OrderSpec) -> Result<OrderAck, BrokerError>;

    /// Cancel a working order.
    async fn cancel_order(&self, order_id: OrderId) -> Result<(), BrokerError>;

    /// Poll the current status of an order.
    async fn order_status(&self, order_id: OrderId) -> Result<OrderAck, BrokerError>;

    /// All orders currently working at the broker for the instrument.
    async fn open_orders(&self) -> Result<Vec<OpenOrder>, BrokerError>;

    /// Broker-reported position for the instrument.
    async fn position(&self) -> Result<PositionReport, BrokerError>;

    /// Subscribe to the fill event stream.
    fn subscribe_fills(&self) -> FillSubscription;
}
