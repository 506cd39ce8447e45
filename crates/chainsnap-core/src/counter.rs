//! Next-entity-id sequence state.
//!
//! The live event pipeline mints numeric ids from this store. After an
//! import the counters of imported entities must be pushed past the imported
//! rows, otherwise freshly minted ids would collide with them.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::EntityKind;
use crate::error::SnapshotError;

/// Persisted "next id" for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextEntityId {
    /// Entity name (e.g. `"Account"`).
    pub entity_name: String,
    /// The id the next minted entity will get.
    pub next_id: u64,
}

impl NextEntityId {
    /// Counter state for `entity` after `row_count` rows exist.
    pub fn after_rows(entity: EntityKind, row_count: u64) -> Self {
        Self {
            entity_name: entity.name().to_string(),
            next_id: row_count + 1,
        }
    }
}

/// Trait for loading and saving sequence state.
///
/// Implementations include `MemorySequenceStore` and the Postgres backend.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Load the counter for an entity (returns `None` if never saved).
    async fn load_next_id(&self, entity_name: &str) -> Result<Option<NextEntityId>, SnapshotError>;

    /// Save (upsert) a counter.
    async fn save_next_id(&self, next: NextEntityId) -> Result<(), SnapshotError>;
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory sequence store for tests and dry runs.
#[derive(Default)]
pub struct MemorySequenceStore {
    data: Mutex<HashMap<String, u64>>,
}

impl MemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceStore for MemorySequenceStore {
    async fn load_next_id(&self, entity_name: &str) -> Result<Option<NextEntityId>, SnapshotError> {
        let data = self
            .data
            .lock()
            .map_err(|e| SnapshotError::Storage(e.to_string()))?;
        Ok(data.get(entity_name).map(|&next_id| NextEntityId {
            entity_name: entity_name.to_string(),
            next_id,
        }))
    }

    async fn save_next_id(&self, next: NextEntityId) -> Result<(), SnapshotError> {
        self.data
            .lock()
            .map_err(|e| SnapshotError::Storage(e.to_string()))?
            .insert(next.entity_name, next.next_id);
        Ok(())
    }
}
