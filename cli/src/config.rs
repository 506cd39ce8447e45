//! CLI configuration file (JSON).
//!
//! ```json
//! {
//!   "snapshot": { "path": "/data/export.json", "chunk_size": 1000 },
//!   "postgres": { "max_connections": 4, "status_schema": "squid_processor" },
//!   "log": { "level": "info", "json": true }
//! }
//! ```
//!
//! Every section and field is optional.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use chainsnap_core::SnapshotConfig;
use chainsnap_storage::postgres::PostgresOptions;

use crate::logging::LogConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub snapshot: SnapshotConfig,
    pub postgres: PostgresOptions,
    pub log: LogConfig,
}

impl CliConfig {
    /// Load from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        anyhow::ensure!(config.snapshot.chunk_size > 0, "snapshot.chunk_size must be > 0");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chainsnap.json");
        std::fs::write(&path, r#"{ "snapshot": { "chunk_size": 50 }, "log": { "json": true } }"#).unwrap();

        let cfg = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.snapshot.chunk_size, 50);
        assert!(cfg.log.json);
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.postgres.status_table, "status");
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chainsnap.json");
        std::fs::write(&path, r#"{ "snapshot": { "chunk_size": 0 } }"#).unwrap();
        assert!(CliConfig::load(Some(&path)).is_err());
    }
}
