//! Tracing setup.
//!
//! Console logging via `tracing-subscriber` with env-filter support.
//!
//! # Configuration
//!
//! - `RUST_LOG`: log level filter (default: `info`)
//! - `GRID_LOG_ANSI`: set to `false` to disable ANSI colors
//!
//! # Usage
//!
//! ```rust,ignore
//! use grid_engine::telemetry::init_telemetry;
//!
//! #[tokio::main]
//! async fn main() {
//!     init_telemetry();
//!     // ... application code
//! }
//! ```

use tracing_subscriber::EnvFilter;

/// Initialize console tracing.
///
/// Safe to call more than once; subsequent calls are no-ops (relevant for
/// tests that share a process).
pub fn init_telemetry() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let ansi = std::env::var("GRID_LOG_ANSI")
        .map(|v| v != "false")
        .unwrap_or(true);

    let result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(ansi)
        .try_init();

    if result.is_ok() {
        tracing::info!("tracing initialized");
    }
}
