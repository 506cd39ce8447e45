//! In-memory database backend.
//!
//! Stores catalog tables, the processor height and next-id counters in RAM.
//! Useful for tests and dry runs; every bulk statement is recorded so callers
//! can check how an import was chunked.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use chainsnap_core::catalog::{CatalogEntry, EntityKind};
use chainsnap_core::counter::{MemorySequenceStore, NextEntityId, SequenceStore};
use chainsnap_core::error::SnapshotError;
use chainsnap_core::snapshot::{BatchMode, Record, TransposedChunk};
use chainsnap_core::source::{ExportSource, ExportTransaction, ImportSink};

type Table = BTreeMap<String, Record>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A bulk statement executed against the in-memory database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub entity: EntityKind,
    pub mode: BatchMode,
    pub rows: usize,
}

#[derive(Debug, Default)]
struct Height {
    current: u64,
    /// Values served by the next `chain_height` reads, before `current`.
    scripted: VecDeque<u64>,
}

/// In-memory database.
///
/// All data is lost when the value is dropped.
#[derive(Default)]
pub struct InMemoryDatabase {
    tables: Mutex<HashMap<EntityKind, Table>>,
    height: Arc<Mutex<Height>>,
    statements: Mutex<Vec<Statement>>,
    fail_statement: Mutex<Option<usize>>,
    sequences: MemorySequenceStore,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the processor height.
    pub fn set_height(&self, height: u64) {
        lock(&self.height).current = height;
    }

    /// Serve these heights to the next `chain_height` reads (simulates a
    /// processor advancing mid-export).
    pub fn script_heights(&self, heights: impl IntoIterator<Item = u64>) {
        lock(&self.height).scripted.extend(heights);
    }

    /// Make the `n`th bulk statement from now fail (1-based).
    pub fn fail_statement(&self, n: usize) {
        let done = lock(&self.statements).len();
        *lock(&self.fail_statement) = Some(done + n);
    }

    /// Write rows directly, as the chain processor would. Existing ids are
    /// replaced.
    pub fn put_rows(&self, entity: EntityKind, rows: impl IntoIterator<Item = Record>) {
        let mut tables = lock(&self.tables);
        let table = tables.entry(entity).or_default();
        for row in rows {
            let key = row.get("id").map(id_key).unwrap_or_default();
            table.insert(key, row);
        }
    }

    /// All rows of an entity, ordered by id.
    pub fn rows(&self, entity: EntityKind) -> Vec<Record> {
        lock(&self.tables)
            .get(&entity)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row(&self, entity: EntityKind, id: &str) -> Option<Record> {
        lock(&self.tables).get(&entity)?.get(id).cloned()
    }

    /// Bulk statements executed so far.
    pub fn statements(&self) -> Vec<Statement> {
        lock(&self.statements).clone()
    }

    fn begin_statement(&self, entity: EntityKind, mode: BatchMode, rows: usize) -> Result<(), SnapshotError> {
        let mut statements = lock(&self.statements);
        let number = statements.len() + 1;
        if *lock(&self.fail_statement) == Some(number) {
            *lock(&self.fail_statement) = None;
            return Err(SnapshotError::Storage(format!(
                "statement #{number} on {entity} failed"
            )));
        }
        statements.push(Statement { entity, mode, rows });
        Ok(())
    }
}

fn chunk_rows(chunk: &TransposedChunk) -> impl Iterator<Item = Record> + '_ {
    (0..chunk.rows).map(move |i| {
        chunk
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.values[i].clone()))
            .collect()
    })
}

// ─── Export ───────────────────────────────────────────────────────────────────

/// Export transaction over a copy of the tables taken at `begin_export`.
struct MemoryExport {
    tables: HashMap<EntityKind, Table>,
    height: Arc<Mutex<Height>>,
}

#[async_trait]
impl ExportSource for InMemoryDatabase {
    async fn begin_export(&self) -> Result<Box<dyn ExportTransaction>, SnapshotError> {
        Ok(Box::new(MemoryExport {
            tables: lock(&self.tables).clone(),
            height: self.height.clone(),
        }))
    }
}

#[async_trait]
impl ExportTransaction for MemoryExport {
    async fn chain_height(&mut self) -> Result<u64, SnapshotError> {
        let mut height = lock(&self.height);
        Ok(match height.scripted.pop_front() {
            Some(h) => h,
            None => height.current,
        })
    }

    async fn fetch_rows(&mut self, entry: CatalogEntry) -> Result<Vec<Record>, SnapshotError> {
        let Some(table) = self.tables.get(&entry.entity()) else {
            return Ok(Vec::new());
        };
        let rows = match entry.fields() {
            None => table.values().cloned().collect(),
            Some(fields) => table
                .values()
                .map(|row| {
                    std::iter::once("id")
                        .chain(fields.iter().copied())
                        .map(|f| (f.to_string(), row.get(f).cloned().unwrap_or(Value::Null)))
                        .collect()
                })
                .collect(),
        };
        Ok(rows)
    }

    async fn commit(self: Box<Self>) -> Result<(), SnapshotError> {
        Ok(())
    }
}

// ─── Import ───────────────────────────────────────────────────────────────────

#[async_trait]
impl ImportSink for InMemoryDatabase {
    async fn insert_chunk(
        &self,
        entity: EntityKind,
        chunk: &TransposedChunk,
    ) -> Result<u64, SnapshotError> {
        self.begin_statement(entity, BatchMode::Insert, chunk.rows)?;
        let mut tables = lock(&self.tables);
        let table = tables.entry(entity).or_default();
        let mut inserted = 0;
        for row in chunk_rows(chunk) {
            let key = row.get("id").map(id_key).unwrap_or_default();
            // ON CONFLICT (id) DO NOTHING
            if !table.contains_key(&key) {
                table.insert(key, row);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn update_chunk(
        &self,
        entity: EntityKind,
        chunk: &TransposedChunk,
    ) -> Result<u64, SnapshotError> {
        self.begin_statement(entity, BatchMode::Update, chunk.rows)?;
        let mut tables = lock(&self.tables);
        let table = tables.entry(entity).or_default();
        let mut matched = 0;
        for row in chunk_rows(chunk) {
            let key = row.get("id").map(id_key).unwrap_or_default();
            if let Some(existing) = table.get_mut(&key) {
                for (column, value) in row.into_iter().filter(|(c, _)| c != "id") {
                    existing.insert(column, value);
                }
                matched += 1;
            }
        }
        Ok(matched)
    }

    async fn count_rows(&self, entity: EntityKind) -> Result<u64, SnapshotError> {
        Ok(lock(&self.tables).get(&entity).map_or(0, |t| t.len() as u64))
    }
}

#[async_trait]
impl SequenceStore for InMemoryDatabase {
    async fn load_next_id(&self, entity_name: &str) -> Result<Option<NextEntityId>, SnapshotError> {
        self.sequences.load_next_id(entity_name).await
    }

    async fn save_next_id(&self, next: NextEntityId) -> Result<(), SnapshotError> {
        self.sequences.save_next_id(next).await
    }
}
