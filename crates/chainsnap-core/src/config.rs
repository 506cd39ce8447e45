//! Snapshot engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::version::ToolVersion;

/// Configuration shared by the exporter and importer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot file location.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Records per bulk statement on import.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Version written into exported snapshots.
    #[serde(default = "ToolVersion::current")]
    pub tool_version: ToolVersion,
}

fn default_path() -> PathBuf {
    PathBuf::from("db/export/export.json")
}

fn default_chunk_size() -> usize {
    1_000
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            chunk_size: default_chunk_size(),
            tool_version: ToolVersion::current(),
        }
    }
}
