//! Error types for snapshot export and import.

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::EntityKind;

/// Errors that can occur while exporting, migrating or importing a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No pending snapshot at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Chain height changed during export: {before} -> {after}")]
    Consistency { before: u64, after: u64 },

    #[error("Bulk apply failed for {entity} (chunk #{chunk}): {reason}")]
    BulkApply {
        entity: EntityKind,
        chunk: usize,
        reason: String,
    },

    #[error("Malformed snapshot: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Record #{index} of {entity} has a different field set than the first record")]
    InconsistentFields { entity: EntityKind, index: usize },

    #[error("Record #{index} of {entity} has no 'id' field")]
    MissingId { entity: EntityKind, index: usize },

    #[error("Column {table}.{column} has unsupported type '{type_name}'")]
    UnsupportedColumn {
        table: String,
        column: String,
        type_name: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if there was no pending snapshot to act on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the operator can simply re-run the same operation.
    ///
    /// Export is re-run after a height change; import is re-run against the
    /// still-pending file after a database failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Consistency { .. } | Self::BulkApply { .. } | Self::Storage(_)
        )
    }
}
