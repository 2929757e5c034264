//! Top-level error taxonomy for the grid engine.
//!
//! Each module defines its own `thiserror` enum; this module aggregates
//! them for startup and the run loop. The taxonomy follows four classes:
//! transient failures (logged, retried next cycle — never surfaced here),
//! duplicates (discarded at the point of detection), irreconcilable state
//! (fatal, with an operator diagnostic), and fatal infrastructure
//! failures (abort startup).

use thiserror::Error;

use crate::broker::BrokerError;
use crate::config::ConfigError;
use crate::engine::ReconcileError;
use crate::ledger::LedgerError;
use crate::models::LadderError;

/// Fatal errors that abort startup or the run loop.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Ladder file could not be loaded.
    #[error("ladder error: {0}")]
    Ladder(#[from] LadderError),

    /// Trade ledger could not be opened or written.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Broker gateway failed during startup.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Reconciliation found irreconcilable state.
    #[error("reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),
}

impl EngineError {
    /// Operator-directed remediation text for this failure.
    ///
    /// Fatal errors halt the engine rather than guess; this text tells the
    /// operator where to look before restarting.
    #[must_use]
    pub fn remediation(&self) -> String {
        match self {
            Self::Config(_) => {
                "Fix the configuration file (or the environment variables it references) \
                 and restart."
                    .to_string()
            }
            Self::Ladder(_) => {
                "Fix the ladder CSV (dense levels from 0, positive unique quantities) \
                 and restart."
                    .to_string()
            }
            Self::Ledger(_) => {
                "Check that the ledger database path is writable and the schema intact, \
                 then restart."
                    .to_string()
            }
            Self::Broker(_) => {
                "Check broker connectivity and credentials, then restart.".to_string()
            }
            Self::Reconcile(e) => e.remediation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_mentions_config() {
        let err = EngineError::Config(ConfigError::Validation("bad ratio".to_string()));
        assert!(err.remediation().contains("configuration"));
    }

    #[test]
    fn display_includes_source_message() {
        let err = EngineError::Ledger(LedgerError::Query("no such table".to_string()));
        assert!(err.to_string().contains("no such table"));
    }
}
