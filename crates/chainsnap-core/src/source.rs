//! Database seams used by the exporter and importer.
//!
//! Backends live in `chainsnap-storage` (in-memory and Postgres).

use async_trait::async_trait;

use crate::catalog::{CatalogEntry, EntityKind};
use crate::error::SnapshotError;
use crate::snapshot::{Record, TransposedChunk};

/// A database that snapshots can be exported from.
#[async_trait]
pub trait ExportSource: Send + Sync {
    /// Open the single read transaction an export runs in.
    async fn begin_export(&self) -> Result<Box<dyn ExportTransaction>, SnapshotError>;
}

/// One open export transaction.
///
/// Dropping it without calling [`commit`](ExportTransaction::commit) rolls
/// it back.
#[async_trait]
pub trait ExportTransaction: Send {
    /// Height the chain processor has reached.
    async fn chain_height(&mut self) -> Result<u64, SnapshotError>;

    /// Rows of one catalog entity: every column for `insert` entries, `id`
    /// plus the declared fields for `update` entries.
    async fn fetch_rows(&mut self, entry: CatalogEntry) -> Result<Vec<Record>, SnapshotError>;

    async fn commit(self: Box<Self>) -> Result<(), SnapshotError>;
}

/// A database that snapshots are imported into.
///
/// Each call is its own unit of work; an import is deliberately not wrapped
/// in one transaction.
#[async_trait]
pub trait ImportSink: Send + Sync {
    /// Bulk-insert a chunk of full rows. Rows whose `id` already exists are
    /// skipped, so a chunk can be re-applied. Returns the rows written.
    async fn insert_chunk(
        &self,
        entity: EntityKind,
        chunk: &TransposedChunk,
    ) -> Result<u64, SnapshotError>;

    /// Set every non-`id` column of the chunk on the rows matched by `id`,
    /// in one statement. Returns the rows matched.
    async fn update_chunk(
        &self,
        entity: EntityKind,
        chunk: &TransposedChunk,
    ) -> Result<u64, SnapshotError>;

    /// Number of rows currently stored for an entity.
    async fn count_rows(&self, entity: EntityKind) -> Result<u64, SnapshotError>;
}
