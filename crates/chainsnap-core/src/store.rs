//! Snapshot store — the file-system side of a snapshot.
//!
//! A snapshot file is either *pending* (`<path>`) or *imported*
//! (`<path>.imported`). The rename from one to the other is the commit point
//! of an import; an imported file is never read again.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::SnapshotError;
use crate::snapshot::Snapshot;

/// Suffix appended to a snapshot file once it has been imported.
pub const IMPORTED_SUFFIX: &str = ".imported";

/// State of a snapshot path on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Nothing at the path, and no imported marker either.
    Absent,
    /// The file exists and has not been imported yet.
    Pending,
    /// The file was renamed away by a successful import.
    Imported,
}

/// File-backed snapshot location.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the file ends up after import.
    pub fn imported_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(IMPORTED_SUFFIX);
        PathBuf::from(name)
    }

    pub async fn marker(&self) -> Result<Marker, SnapshotError> {
        if self.exists(&self.path).await? {
            return Ok(Marker::Pending);
        }
        let imported = self.imported_path();
        if self.exists(&imported).await? {
            return Ok(Marker::Imported);
        }
        Ok(Marker::Absent)
    }

    /// Read and parse the pending snapshot.
    pub async fn read(&self) -> Result<Snapshot, SnapshotError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SnapshotError::NotFound {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(SnapshotError::io(&self.path, e)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Serialize `snapshot` to the path, creating parent directories and
    /// overwriting any previous file.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        self.ensure_parent_dir().await?;
        let bytes = serde_json::to_vec(snapshot)?;
        info!(path = %self.path.display(), bytes = bytes.len(), "Saving export data");
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| SnapshotError::io(&self.path, e))
    }

    /// Create the directory the snapshot lives in, if missing.
    pub async fn ensure_parent_dir(&self) -> Result<(), SnapshotError> {
        let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) else {
            return Ok(());
        };
        if !self.exists(dir).await? {
            info!(dir = %dir.display(), "Creating exports directory");
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| SnapshotError::io(dir, e))?;
        }
        Ok(())
    }

    /// Move the pending file to its imported marker path.
    pub async fn mark_imported(&self) -> Result<PathBuf, SnapshotError> {
        let target = self.imported_path();
        if self.exists(&target).await? {
            warn!(path = %target.display(), "Overwriting previous imported marker");
        }
        info!(path = %target.display(), "Renaming export file");
        tokio::fs::rename(&self.path, &target)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SnapshotError::NotFound {
                    path: self.path.clone(),
                },
                _ => SnapshotError::io(&self.path, e),
            })?;
        Ok(target)
    }

    async fn exists(&self, path: &Path) -> Result<bool, SnapshotError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| SnapshotError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityKind;
    use crate::snapshot::{EntityBatch, SnapshotData};
    use crate::version::ToolVersion;
    use serde_json::json;

    fn sample() -> Snapshot {
        let mut data = SnapshotData::new();
        data.insert(
            EntityKind::Comment,
            EntityBatch::update(vec![json!({ "id": "c1", "is_excluded": true })
                .as_object()
                .cloned()
                .unwrap()]),
        );
        Snapshot {
            data,
            block_number: 1234,
            tool_version: ToolVersion::new(3, 1, 0),
        }
    }

    #[test]
    fn imported_path_appends_suffix() {
        let store = SnapshotStore::new("/data/export/export.json");
        assert_eq!(
            store.imported_path(),
            PathBuf::from("/data/export/export.json.imported")
        );
    }

    #[tokio::test]
    async fn write_creates_directories_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/deeper/export.json"));

        assert_eq!(store.marker().await.unwrap(), Marker::Absent);
        store.write(&sample()).await.unwrap();
        assert_eq!(store.marker().await.unwrap(), Marker::Pending);
        assert_eq!(store.read().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("export.json"));
        store.write(&sample()).await.unwrap();

        let mut newer = sample();
        newer.block_number = 99;
        store.write(&newer).await.unwrap();
        assert_eq!(store.read().await.unwrap().block_number, 99);
    }

    #[tokio::test]
    async fn mark_imported_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("export.json"));
        store.write(&sample()).await.unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let target = store.mark_imported().await.unwrap();
        assert_eq!(store.marker().await.unwrap(), Marker::Imported);
        assert_eq!(std::fs::read(target).unwrap(), before);

        let err = store.read().await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.mark_imported().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn garbage_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let err = SnapshotStore::new(path).read().await.unwrap_err();
        assert!(matches!(err, SnapshotError::Format(_)));
    }
}
