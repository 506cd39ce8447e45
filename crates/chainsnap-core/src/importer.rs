//! Importer — applies a pending snapshot exactly once.
//!
//! # Steps
//! 1. Read the pending snapshot file and map record keys to column names.
//! 2. Run the data migrations newer than the snapshot's tool version.
//! 3. Apply every non-empty batch in catalog order, `chunk_size` records per
//!    bulk statement. Each statement is its own unit of work.
//! 4. Recompute next-id counters for the pending counter migrations.
//! 5. Rename the file to `<path>.imported` (the commit point).
//!
//! A failure before step 5 leaves the file pending; re-running re-applies
//! it from step 1. Migrations give the same output for the same file. Update
//! chunks and counter writes overwrite; insert chunks skip rows that already
//! exist. A re-run therefore converges.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::EntityKind;
use crate::config::SnapshotConfig;
use crate::counter::{NextEntityId, SequenceStore};
use crate::error::SnapshotError;
use crate::migration::{CounterMigration, MigrationChain, MigrationContext};
use crate::snapshot::{normalize_column_names, BatchMode, Snapshot, TransposedChunk};
use crate::source::ImportSink;
use crate::store::SnapshotStore;
use crate::version::ToolVersion;

/// Whether the offchain state import has been dealt with in this process.
///
/// The live pipeline holds off on normal processing past the exported
/// height until this leaves `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportState {
    /// A snapshot may still have to be imported.
    #[default]
    NotStarted,
    /// A snapshot was imported by this process.
    Imported,
    /// There was no pending snapshot.
    NothingToImport,
}

impl ImportState {
    /// `true` once there is nothing left to wait for.
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::NotStarted)
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::Imported => write!(f, "imported"),
            Self::NothingToImport => write!(f, "nothing-to-import"),
        }
    }
}

/// Outcome of applying one entity batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedBatch {
    pub entity: EntityKind,
    pub mode: BatchMode,
    pub records: usize,
    /// Bulk statements issued.
    pub statements: usize,
}

/// What an import did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub block_number: u64,
    pub tool_version: ToolVersion,
    pub batches: Vec<AppliedBatch>,
    pub counters: Vec<NextEntityId>,
    /// Where the consumed file now lives.
    pub imported_path: PathBuf,
}

/// What an import of a given snapshot would do, without touching a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportPlan {
    pub block_number: u64,
    pub tool_version: ToolVersion,
    /// Batches as stored in the file (before migrations).
    pub batches: Vec<AppliedBatch>,
    /// Data migrations that would run, in order.
    pub migrations: Vec<ToolVersion>,
    /// Counter migrations that would run, in order.
    pub counters: Vec<CounterMigration>,
}

/// Applies snapshots and tracks the process-wide import state.
#[derive(Debug)]
pub struct Importer {
    chain: MigrationChain,
    chunk_size: usize,
    state: ImportState,
    export_height: Option<u64>,
}

impl Importer {
    pub fn new(chain: MigrationChain, chunk_size: usize) -> Self {
        Self {
            chain,
            chunk_size: chunk_size.max(1),
            state: ImportState::NotStarted,
            export_height: None,
        }
    }

    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(MigrationChain::builtin(), config.chunk_size)
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    /// `true` if the import was performed or there was nothing to import.
    pub fn is_imported(&self) -> bool {
        self.state.is_settled()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn migrations(&self) -> &MigrationChain {
        &self.chain
    }

    /// Block number recorded in the pending snapshot, or `None` if there is
    /// none. With no pending snapshot the import state becomes
    /// [`ImportState::NothingToImport`].
    pub async fn last_exported_height(
        &mut self,
        store: &SnapshotStore,
    ) -> Result<Option<u64>, SnapshotError> {
        match store.read().await {
            Ok(snapshot) => {
                info!(block = snapshot.block_number, "Last export block number established");
                self.export_height = Some(snapshot.block_number);
                Ok(Some(snapshot.block_number))
            }
            Err(e) if e.is_not_found() => {
                warn!(path = %store.path().display(), "Export file does not exist");
                self.state = ImportState::NothingToImport;
                self.export_height = None;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the live pipeline, about to process `block`, must run the
    /// import first. Requires a prior [`last_exported_height`] call.
    ///
    /// [`last_exported_height`]: Importer::last_exported_height
    pub fn should_import_at(&self, block: u64) -> bool {
        self.state == ImportState::NotStarted
            && self.export_height.is_some_and(|height| block >= height)
    }

    /// Describe how `snapshot` would be imported.
    pub fn plan(&self, snapshot: &Snapshot) -> ImportPlan {
        let from = snapshot.tool_version;
        ImportPlan {
            block_number: snapshot.block_number,
            tool_version: from,
            batches: snapshot
                .data
                .iter()
                .filter(|(_, batch)| !batch.is_empty())
                .map(|(entity, batch)| AppliedBatch {
                    entity: *entity,
                    mode: batch.mode,
                    records: batch.len(),
                    statements: batch.len().div_ceil(self.chunk_size),
                })
                .collect(),
            migrations: self.chain.pending(from).map(|m| m.version).collect(),
            counters: self.chain.pending_counters(from).cloned().collect(),
        }
    }

    /// Import the pending snapshot at `store` into `db`.
    pub async fn import<D>(
        &mut self,
        db: &D,
        store: &SnapshotStore,
    ) -> Result<ImportReport, SnapshotError>
    where
        D: ImportSink + SequenceStore + ?Sized,
    {
        let snapshot = store.read().await?;
        let from = snapshot.tool_version;
        let ctx = MigrationContext::for_snapshot(&snapshot)?;
        let mut data = snapshot.data;
        normalize_column_names(&mut data);
        let data = self.chain.apply(&ctx, data);

        info!(block = snapshot.block_number, version = %from, "Importing offchain state");
        let mut batches = Vec::new();
        for (entity, batch) in &data {
            if batch.is_empty() {
                continue;
            }
            info!(%entity, count = batch.len(), "{} entities...", batch.mode.verb());

            let total = batch.len();
            let mut statements = 0;
            for (i, chunk) in batch.values.chunks(self.chunk_size).enumerate() {
                let number = i + 1;
                let offset = i * self.chunk_size;
                let remaining = total - offset - chunk.len();
                info!(
                    %entity,
                    chunk = number,
                    size = chunk.len(),
                    remaining,
                    "Executing batch"
                );

                let transposed = TransposedChunk::from_records(*entity, chunk, offset)?;
                let applied = match batch.mode {
                    BatchMode::Insert => db.insert_chunk(*entity, &transposed).await,
                    BatchMode::Update => db.update_chunk(*entity, &transposed).await,
                };
                applied.map_err(|e| SnapshotError::BulkApply {
                    entity: *entity,
                    chunk: number,
                    reason: e.to_string(),
                })?;
                statements += 1;
            }

            info!(%entity, "Done {} entities", batch.mode.verb().to_lowercase());
            batches.push(AppliedBatch {
                entity: *entity,
                mode: batch.mode,
                records: total,
                statements,
            });
        }

        let counters = self.migrate_counters(db, from).await?;
        let imported_path = store.mark_imported().await?;
        self.state = ImportState::Imported;
        info!("Import done");

        Ok(ImportReport {
            block_number: snapshot.block_number,
            tool_version: from,
            batches,
            counters,
            imported_path,
        })
    }

    async fn migrate_counters<D>(
        &self,
        db: &D,
        from: ToolVersion,
    ) -> Result<Vec<NextEntityId>, SnapshotError>
    where
        D: ImportSink + SequenceStore + ?Sized,
    {
        let mut saved = Vec::new();
        for migration in self.chain.pending_counters(from) {
            info!(version = %migration.version, "Migrating global counters");
            for &entity in &migration.entities {
                let rows = db.count_rows(entity).await?;
                let next = NextEntityId::after_rows(entity, rows);
                info!(%entity, next_id = next.next_id, "Setting next id");
                db.save_next_id(next.clone()).await?;
                saved.push(next);
            }
        }
        Ok(saved)
    }
}

impl Default for Importer {
    fn default() -> Self {
        Self::from_config(&SnapshotConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::MemorySequenceStore;
    use crate::snapshot::{EntityBatch, Record, Snapshot, SnapshotData};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records statement sizes; fails on the configured call number.
    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(EntityKind, BatchMode, usize)>>,
        fail_on_call: Option<usize>,
        rows: Mutex<u64>,
        seq: MemorySequenceStore,
    }

    impl Recording {
        fn record(&self, entity: EntityKind, mode: BatchMode, rows: usize) -> Result<u64, SnapshotError> {
            let mut calls = self.calls.lock().unwrap();
            if self.fail_on_call == Some(calls.len() + 1) {
                return Err(SnapshotError::Storage("unique violation".into()));
            }
            calls.push((entity, mode, rows));
            *self.rows.lock().unwrap() += rows as u64;
            Ok(rows as u64)
        }
    }

    #[async_trait]
    impl ImportSink for Recording {
        async fn insert_chunk(&self, entity: EntityKind, chunk: &TransposedChunk) -> Result<u64, SnapshotError> {
            self.record(entity, BatchMode::Insert, chunk.rows)
        }
        async fn update_chunk(&self, entity: EntityKind, chunk: &TransposedChunk) -> Result<u64, SnapshotError> {
            self.record(entity, BatchMode::Update, chunk.rows)
        }
        async fn count_rows(&self, _entity: EntityKind) -> Result<u64, SnapshotError> {
            Ok(*self.rows.lock().unwrap())
        }
    }

    #[async_trait]
    impl SequenceStore for Recording {
        async fn load_next_id(&self, name: &str) -> Result<Option<NextEntityId>, SnapshotError> {
            self.seq.load_next_id(name).await
        }
        async fn save_next_id(&self, next: NextEntityId) -> Result<(), SnapshotError> {
            self.seq.save_next_id(next).await
        }
    }

    fn rows(n: usize, f: impl Fn(usize) -> serde_json::Value) -> Vec<Record> {
        (0..n).map(|i| f(i).as_object().cloned().unwrap()).collect()
    }

    async fn write(dir: &tempfile::TempDir, data: SnapshotData, version: &str) -> SnapshotStore {
        let store = SnapshotStore::new(dir.path().join("export.json"));
        store
            .write(&Snapshot {
                data,
                block_number: 900,
                tool_version: ToolVersion::parse(version),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn chunks_update_batches() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = SnapshotData::new();
        data.insert(
            EntityKind::Video,
            EntityBatch::update(rows(2_500, |i| json!({ "id": i.to_string(), "views_num": i }))),
        );
        let store = write(&dir, data, "3.1.0").await;

        let db = Recording::default();
        let mut importer = Importer::new(MigrationChain::new(), 1_000);
        let report = importer.import(&db, &store).await.unwrap();

        let sizes: Vec<_> = db.calls.lock().unwrap().iter().map(|c| c.2).collect();
        assert_eq!(sizes, vec![1_000, 1_000, 500]);
        assert_eq!(report.batches[0].statements, 3);
        assert_eq!(importer.state(), ImportState::Imported);
        assert!(report.counters.is_empty());
    }

    #[tokio::test]
    async fn applies_in_catalog_order_and_skips_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = SnapshotData::new();
        data.insert(EntityKind::Comment, EntityBatch::update(rows(1, |_| json!({ "id": "c", "is_excluded": true }))));
        data.insert(EntityKind::Token, EntityBatch::insert(vec![]));
        data.insert(EntityKind::Account, EntityBatch::insert(rows(2, |i| json!({ "id": i.to_string() }))));
        let store = write(&dir, data, "3.1.0").await;

        let db = Recording::default();
        Importer::new(MigrationChain::new(), 10).import(&db, &store).await.unwrap();

        let calls = db.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                (EntityKind::Account, BatchMode::Insert, 2),
                (EntityKind::Comment, BatchMode::Update, 1),
            ]
        );
    }

    #[tokio::test]
    async fn failure_leaves_file_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = SnapshotData::new();
        data.insert(EntityKind::Account, EntityBatch::insert(rows(30, |i| json!({ "id": i.to_string() }))));
        let store = write(&dir, data, "3.1.0").await;

        let db = Recording {
            fail_on_call: Some(2),
            ..Default::default()
        };
        let mut importer = Importer::new(MigrationChain::new(), 10);
        let err = importer.import(&db, &store).await.unwrap_err();

        assert!(matches!(
            err,
            SnapshotError::BulkApply { entity: EntityKind::Account, chunk: 2, .. }
        ));
        assert_eq!(importer.state(), ImportState::NotStarted);
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn counters_follow_row_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = SnapshotData::new();
        data.insert(EntityKind::Account, EntityBatch::insert(rows(5, |i| json!({ "id": i.to_string() }))));
        let store = write(&dir, data, "3.0.1").await;

        let db = Recording::default();
        let report = Importer::default().import(&db, &store).await.unwrap();

        assert_eq!(report.counters, vec![NextEntityId::after_rows(EntityKind::Account, 5)]);
        assert_eq!(db.load_next_id("Account").await.unwrap().unwrap().next_id, 6);
    }

    #[tokio::test]
    async fn second_import_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = write(&dir, SnapshotData::new(), "3.1.0").await;

        let db = Recording::default();
        let mut importer = Importer::default();
        importer.import(&db, &store).await.unwrap();
        let err = importer.import(&db, &store).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn height_gates_the_import() {
        let dir = tempfile::tempdir().unwrap();
        let store = write(&dir, SnapshotData::new(), "3.1.0").await;

        let mut importer = Importer::default();
        assert!(!importer.should_import_at(10_000));
        assert_eq!(importer.last_exported_height(&store).await.unwrap(), Some(900));
        assert!(!importer.should_import_at(899));
        assert!(importer.should_import_at(900));
        assert!(!importer.is_imported());

        importer.import(&Recording::default(), &store).await.unwrap();
        assert!(!importer.should_import_at(901));
        assert!(importer.is_imported());
    }

    #[test]
    fn plan_lists_batches_and_pending_migrations() {
        let mut data = SnapshotData::new();
        data.insert(EntityKind::Video, EntityBatch::update(rows(2_001, |i| json!({ "id": i.to_string() }))));
        data.insert(EntityKind::Report, EntityBatch::insert(vec![]));
        let snapshot = Snapshot {
            data,
            block_number: 5,
            tool_version: ToolVersion::parse("2.0.0"),
        };

        let plan = Importer::default().plan(&snapshot);
        assert_eq!(
            plan.batches,
            vec![AppliedBatch {
                entity: EntityKind::Video,
                mode: BatchMode::Update,
                records: 2_001,
                statements: 3,
            }]
        );
        assert_eq!(plan.migrations, vec![ToolVersion::new(3, 0, 0)]);
        assert_eq!(plan.counters.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_means_nothing_to_import() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("missing.json"));

        let mut importer = Importer::default();
        assert_eq!(importer.last_exported_height(&store).await.unwrap(), None);
        assert_eq!(importer.state(), ImportState::NothingToImport);
        assert!(importer.is_imported());
        assert!(!importer.should_import_at(1));
    }
}
