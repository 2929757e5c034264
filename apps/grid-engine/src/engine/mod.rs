//! The grid engine core.
//!
//! `GridEngine` owns the in-memory state behind one async lock and
//! coordinates the collaborators: reconciliation seeds consistent state
//! at startup, the fill processor is the sole mutator afterwards, the
//! queue manager keeps conditional buys working ahead of the grid, and
//! the bootstrap places the very first position.

mod bootstrap;
mod fills;
mod queue;
mod reconcile;
mod state;

pub use reconcile::{ReconcileError, Reconciler};
pub use state::EngineState;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use crate::broker::BrokerGateway;
use crate::config::Config;
use crate::error::EngineError;
use crate::ledger::TradeLedger;
use crate::models::Ladder;
use crate::price::PriceSource;
use crate::snapshot::SnapshotStore;

/// The grid trading engine.
pub struct GridEngine {
    symbol: String,
    strategy: crate::config::StrategyConfig,
    ladder: Ladder,
    broker: Arc<dyn BrokerGateway>,
    ledger: Arc<dyn TradeLedger>,
    prices: Arc<dyn PriceSource>,
    snapshots: SnapshotStore,
    state: Mutex<EngineState>,
    l0_in_flight: AtomicBool,
}

impl GridEngine {
    /// Assemble the engine from its collaborators.
    #[must_use]
    pub fn new(
        config: &Config,
        ladder: Ladder,
        broker: Arc<dyn BrokerGateway>,
        ledger: Arc<dyn TradeLedger>,
        prices: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            symbol: config.instrument.symbol.clone(),
            strategy: config.strategy.clone(),
            ladder,
            broker,
            ledger,
            prices,
            snapshots: SnapshotStore::new(&config.persistence.snapshot_path),
            state: Mutex::new(EngineState::empty()),
            l0_in_flight: AtomicBool::new(false),
        }
    }

    /// The traded symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Clone of the current in-memory state (diagnostics and tests).
    pub async fn current_state(&self) -> EngineState {
        self.state.lock().await.clone()
    }

    /// Reconcile the ledger against the broker and seed in-memory state.
    ///
    /// Runs exactly once, before any new trigger is accepted; afterwards
    /// the fill processor is the sole mutator of inventory.
    ///
    /// # Errors
    ///
    /// Returns an error on any irreconcilable condition or startup
    /// infrastructure failure; the caller must halt.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        let reconciled = Reconciler::new(
            self.broker.as_ref(),
            self.ledger.as_ref(),
            &self.ladder,
            &self.strategy,
            &self.symbol,
        )
        .run()
        .await?;

        let mut state = self.state.lock().await;
        *state = reconciled;
        self.persist_snapshot(&state).await;
        self.refresh_buy_queue(&state, None).await;
        Ok(())
    }

    /// Run the engine until the shutdown signal fires.
    ///
    /// Performs startup reconciliation, subscribes to the fill stream,
    /// then polls: bootstrap attempts while level 0 is unfilled, plus a
    /// heartbeat log each cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if startup reconciliation fails.
    pub async fn run(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        // Subscribe before reconciliation places any order so no fill is
        // ever missed between startup and the event loop.
        let mut fills = self.broker.subscribe_fills();

        self.initialize().await?;

        let engine = Arc::clone(self);
        let mut fill_shutdown = shutdown.clone();
        let fill_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = fills.recv() => match event {
                        Some(event) => engine.on_fill(event).await,
                        None => {
                            warn!("fill stream closed");
                            break;
                        }
                    },
                    _ = fill_shutdown.changed() => break,
                }
            }
        });

        info!(symbol = %self.symbol, "engine started");
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.strategy.poll_interval()) => {
                    self.try_bootstrap().await;
                    self.heartbeat().await;
                }
                _ = shutdown.changed() => break,
            }
        }

        // The fill task exits through its own view of the shutdown channel.
        let _ = fill_task.await;
        info!("engine stopped");
        Ok(())
    }

    async fn heartbeat(&self) {
        let (open_lots, next_level) = {
            let state = self.state.lock().await;
            (state.open_lot_count(), state.next_level)
        };

        match self.prices.latest_price(&self.symbol).await {
            Ok(price) => {
                info!(open_lots, next_level, price = %price, "engine heartbeat");
            }
            Err(e) => {
                warn!(error = %e, "price unavailable this cycle");
                info!(open_lots, next_level, "engine heartbeat");
            }
        }
    }

    /// Best-effort diagnostic snapshot; the ledger stays authoritative.
    pub(crate) async fn persist_snapshot(&self, state: &EngineState) {
        if let Err(e) = self.snapshots.write(state).await {
            warn!(error = %e, "snapshot write failed; continuing");
        }
    }
}
