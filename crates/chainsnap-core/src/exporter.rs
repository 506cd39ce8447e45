//! Exporter — writes a consistent snapshot of the catalog entities.
//!
//! All rows are read inside one transaction. The chain height is read at the
//! start and again at the end; if the processor advanced in between, the
//! snapshot would straddle two chain states and is rejected. Nothing is
//! written to disk until that check passes.

use tracing::info;

use crate::catalog::catalog;
use crate::config::SnapshotConfig;
use crate::error::SnapshotError;
use crate::snapshot::{EntityBatch, Snapshot, SnapshotData};
use crate::source::ExportSource;
use crate::store::SnapshotStore;
use crate::version::ToolVersion;

/// Produces snapshot files.
#[derive(Debug, Clone)]
pub struct Exporter {
    tool_version: ToolVersion,
}

impl Exporter {
    pub fn new(tool_version: ToolVersion) -> Self {
        Self { tool_version }
    }

    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(config.tool_version)
    }

    /// Export the catalog entities of `source` to `store`, overwriting any
    /// previous file. Returns the snapshot that was written.
    pub async fn export<S>(&self, source: &S, store: &SnapshotStore) -> Result<Snapshot, SnapshotError>
    where
        S: ExportSource + ?Sized,
    {
        store.ensure_parent_dir().await?;
        info!(version = %self.tool_version, "Exporting offchain state");

        let mut tx = source.begin_export().await?;
        let before = tx.chain_height().await?;
        info!(block = before, "Export block number");

        let mut data = SnapshotData::new();
        for entry in catalog() {
            let values = tx.fetch_rows(entry).await?;
            if values.is_empty() {
                continue;
            }
            let entity = entry.entity();
            match entry.fields() {
                Some(fields) => info!(
                    %entity,
                    count = values.len(),
                    fields = %fields.join(", "),
                    "Exporting entities (type: update)"
                ),
                None => info!(%entity, count = values.len(), "Exporting entities (type: insert)"),
            }
            data.insert(
                entity,
                EntityBatch {
                    mode: entry.mode(),
                    values,
                },
            );
        }

        let after = tx.chain_height().await?;
        if before != after {
            return Err(SnapshotError::Consistency { before, after });
        }
        tx.commit().await?;

        let snapshot = Snapshot {
            data,
            block_number: after,
            tool_version: self.tool_version,
        };
        store.write(&snapshot).await?;
        info!(
            block = snapshot.block_number,
            records = snapshot.record_count(),
            "Export done"
        );
        Ok(snapshot)
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(ToolVersion::current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, EntityKind};
    use crate::snapshot::{BatchMode, Record};
    use crate::source::ExportTransaction;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Serves scripted heights and one row per requested entity kind.
    struct Scripted {
        heights: Mutex<VecDeque<u64>>,
        rows: Vec<(EntityKind, Record)>,
        committed: Arc<Mutex<bool>>,
    }

    struct ScriptedTx {
        heights: VecDeque<u64>,
        rows: Vec<(EntityKind, Record)>,
        committed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl ExportSource for Scripted {
        async fn begin_export(&self) -> Result<Box<dyn ExportTransaction>, SnapshotError> {
            Ok(Box::new(ScriptedTx {
                heights: self.heights.lock().unwrap().clone(),
                rows: self.rows.clone(),
                committed: self.committed.clone(),
            }))
        }
    }

    #[async_trait]
    impl ExportTransaction for ScriptedTx {
        async fn chain_height(&mut self) -> Result<u64, SnapshotError> {
            self.heights
                .pop_front()
                .ok_or_else(|| SnapshotError::Storage("no height".into()))
        }

        async fn fetch_rows(&mut self, entry: CatalogEntry) -> Result<Vec<Record>, SnapshotError> {
            Ok(self
                .rows
                .iter()
                .filter(|(k, _)| *k == entry.entity())
                .map(|(_, r)| r.clone())
                .collect())
        }

        async fn commit(self: Box<Self>) -> Result<(), SnapshotError> {
            *self.committed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn source(heights: &[u64]) -> Scripted {
        Scripted {
            heights: Mutex::new(heights.iter().copied().collect()),
            rows: vec![
                (EntityKind::User, json!({ "id": "u1", "is_root": true }).as_object().cloned().unwrap()),
                (EntityKind::Video, json!({ "id": "v1", "is_excluded": false, "views_num": 3 }).as_object().cloned().unwrap()),
            ],
            committed: Arc::new(Mutex::new(false)),
        }
    }

    #[tokio::test]
    async fn writes_snapshot_when_height_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("out/export.json"));
        let src = source(&[500, 500]);

        let snapshot = Exporter::new(ToolVersion::new(3, 1, 0))
            .export(&src, &store)
            .await
            .unwrap();

        assert!(*src.committed.lock().unwrap());
        assert_eq!(snapshot.block_number, 500);
        // empty entities are omitted, not exported as empty batches
        assert_eq!(snapshot.data.len(), 2);
        assert_eq!(snapshot.data[&EntityKind::User].mode, BatchMode::Insert);
        assert_eq!(snapshot.data[&EntityKind::Video].mode, BatchMode::Update);
        assert_eq!(store.read().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn height_change_aborts_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("export.json"));
        let src = source(&[500, 501]);

        let err = Exporter::default().export(&src, &store).await.unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Consistency { before: 500, after: 501 }
        ));
        assert!(!*src.committed.lock().unwrap());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn re_export_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("export.json"));
        let exporter = Exporter::new(ToolVersion::new(3, 1, 0));

        exporter.export(&source(&[7, 7]), &store).await.unwrap();
        let first = std::fs::read(store.path()).unwrap();
        exporter.export(&source(&[7, 7]), &store).await.unwrap();
        let second = std::fs::read(store.path()).unwrap();
        assert_eq!(first, second);
    }
}
