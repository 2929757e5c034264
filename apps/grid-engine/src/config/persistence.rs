//! Ledger and snapshot paths.

use serde::{Deserialize, Serialize};

/// Where durable and diagnostic state lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite trade ledger path (the source of truth).
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
    /// Diagnostic JSON snapshot path (derived, best-effort).
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

fn default_ledger_path() -> String {
    "grid-ledger.sqlite".to_string()
}

fn default_snapshot_path() -> String {
    "grid-state.json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PersistenceConfig::default();
        assert_eq!(config.ledger_path, "grid-ledger.sqlite");
        assert_eq!(config.snapshot_path, "grid-state.json");
    }
}
