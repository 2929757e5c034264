//! Grid Engine Binary
//!
//! Starts the grid trading engine.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin grid-engine
//! ```
//!
//! # Environment Variables
//!
//! - `GRID_CONFIG`: path to the YAML config (default: `grid-engine.yaml`,
//!   falling back to built-in defaults when the file does not exist)
//! - `ALPACA_KEY` / `ALPACA_SECRET`: market-data credentials, referenced
//!   from the config file via `${ALPACA_KEY}` interpolation
//! - `RUST_LOG`: log level (default: info)
//!
//! Startup order: configuration, ladder, ledger, gateway, then one
//! reconciliation pass before the event loop begins. Any irreconcilable
//! state halts the process with an operator diagnostic.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use grid_engine::broker::{BrokerGateway, MockBrokerGateway};
use grid_engine::config::{self, Config, PriceFeedProvider};
use grid_engine::engine::GridEngine;
use grid_engine::error::EngineError;
use grid_engine::ledger::{SqliteTradeLedger, TradeLedger};
use grid_engine::models::Ladder;
use grid_engine::price::{AlpacaPriceConfig, AlpacaPriceSource, MockPriceSource, PriceSource};
use grid_engine::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry();

    if let Err(e) = run().await {
        critical_alert(&e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), EngineError> {
    let config = load_configuration()?;
    info!(
        symbol = %config.instrument.symbol,
        ladder = %config.strategy.ladder_path,
        ledger = %config.persistence.ledger_path,
        "configuration loaded"
    );

    let ladder = Ladder::load(&config.strategy.ladder_path)?;
    info!(levels = ladder.len(), "ladder loaded");

    let ledger: Arc<dyn TradeLedger> =
        Arc::new(SqliteTradeLedger::open(&config.persistence.ledger_path).await?);

    let prices = build_price_source(&config)?;

    // The broker session itself is an external collaborator; until a live
    // gateway is wired in, the simulated gateway stands behind the port.
    warn!("no live broker session configured, using the simulated gateway");
    let broker: Arc<dyn BrokerGateway> = Arc::new(MockBrokerGateway::new());
    broker.connect().await?;
    info!("broker session established");

    let engine = Arc::new(GridEngine::new(&config, ladder, broker, ledger, prices));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!(error = %e, "cannot listen for shutdown signal"),
        }
    });

    engine.run(shutdown_rx).await
}

fn load_configuration() -> Result<Config, EngineError> {
    if let Ok(path) = std::env::var("GRID_CONFIG") {
        return Ok(config::load_config(Some(&path))?);
    }
    if std::path::Path::new("grid-engine.yaml").exists() {
        return Ok(config::load_config(None)?);
    }
    info!("no config file found, using built-in defaults");
    let config = Config::default();
    config.validate()?;
    Ok(config)
}

fn build_price_source(config: &Config) -> Result<Arc<dyn PriceSource>, EngineError> {
    match config.price_feed.provider {
        PriceFeedProvider::Alpaca => {
            let mut price_config = AlpacaPriceConfig::new(
                config.price_feed.api_key.clone(),
                config.price_feed.api_secret.clone(),
            );
            price_config.data_base_url = config.price_feed.data_base_url.clone();
            let source = AlpacaPriceSource::new(price_config).map_err(|e| {
                grid_engine::config::ConfigError::Validation(format!("price feed: {e}"))
            })?;
            Ok(Arc::new(source))
        }
        PriceFeedProvider::Mock => {
            warn!("using the mock price source, no live market data");
            Ok(Arc::new(MockPriceSource::new()))
        }
    }
}

fn critical_alert(error: &EngineError) {
    error!("============================================================");
    error!("CRITICAL: {error}");
    error!("{}", error.remediation());
    error!("The engine will now shut down to prevent damage.");
    error!("============================================================");
}
