//! Snapshot data model and its on-disk JSON shape.
//!
//! ```json
//! {
//!   "data": { "Channel": { "type": "update", "values": [{ "id": "1", "is_excluded": true }] } },
//!   "blockNumber": 4200000,
//!   "orionVersion": "3.1.0"
//! }
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::EntityKind;
use crate::error::SnapshotError;
use crate::version::ToolVersion;

/// One database row, keyed by column name.
pub type Record = serde_json::Map<String, Value>;

/// Entity batches keyed by entity; iteration follows catalog order.
pub type SnapshotData = BTreeMap<EntityKind, EntityBatch>;

// ─── BatchMode ────────────────────────────────────────────────────────────────

/// How a batch is applied on import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// Full rows, bulk-inserted.
    Insert,
    /// `id` plus mergeable columns, bulk-updated by `id`.
    Update,
}

impl BatchMode {
    /// Name used in the snapshot file.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Self::Insert => "Inserting",
            Self::Update => "Updating",
        }
    }
}

// ─── EntityBatch ──────────────────────────────────────────────────────────────

/// All exported rows of a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityBatch {
    #[serde(rename = "type")]
    pub mode: BatchMode,
    pub values: Vec<Record>,
}

impl EntityBatch {
    pub fn insert(values: Vec<Record>) -> Self {
        Self {
            mode: BatchMode::Insert,
            values,
        }
    }

    pub fn update(values: Vec<Record>) -> Self {
        Self {
            mode: BatchMode::Update,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// A point-in-time export of offchain state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub data: SnapshotData,
    /// Chain height the export was taken at.
    #[serde(rename = "blockNumber")]
    pub block_number: u64,
    /// Version of the tool that wrote the file (`0.0.0` for legacy files).
    #[serde(rename = "orionVersion", default)]
    pub tool_version: ToolVersion,
}

impl Snapshot {
    /// Total number of records across all batches.
    pub fn record_count(&self) -> usize {
        self.data.values().map(EntityBatch::len).sum()
    }
}

// ─── Column names ─────────────────────────────────────────────────────────────

/// Database column name for a record key.
///
/// Older tools wrote insert batches with camelCase entity properties
/// (`videoId`, `isRoot`); columns are snake_case (`video_id`, `is_root`).
/// Keys without uppercase letters are returned unchanged.
pub fn column_name(key: &str) -> Cow<'_, str> {
    if !key.bytes().any(|b| b.is_ascii_uppercase()) {
        return Cow::Borrowed(key);
    }
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_uppercase() {
            out.push(c);
            continue;
        }
        let prev = i.checked_sub(1).map(|j| chars[j]);
        let next = chars.get(i + 1).copied();
        let boundary = match prev {
            Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
            // end of an acronym: `HTMLParser` -> `html_parser`
            Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
            _ => false,
        };
        if boundary {
            out.push('_');
        }
        out.push(c.to_ascii_lowercase());
    }
    Cow::Owned(out)
}

/// Rewrite every record key in `data` to its [`column_name`]. Field order is
/// kept.
pub fn normalize_column_names(data: &mut SnapshotData) {
    for batch in data.values_mut() {
        for record in &mut batch.values {
            if !record.keys().any(|k| matches!(column_name(k), Cow::Owned(_))) {
                continue;
            }
            *record = std::mem::take(record)
                .into_iter()
                .map(|(key, value)| (column_name(&key).into_owned(), value))
                .collect();
        }
    }
}

// ─── TransposedChunk ──────────────────────────────────────────────────────────

/// A single column of a transposed chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

/// A chunk of records turned column-wise: one array of values per column,
/// all arrays in row order. This is the shape bound to a single
/// `unnest(...)` bulk statement.
#[derive(Debug, Clone, PartialEq)]
pub struct TransposedChunk {
    pub columns: Vec<Column>,
    pub rows: usize,
}

impl TransposedChunk {
    /// Transpose `records`, requiring every record to carry exactly the field
    /// set of the first one, including `id`.
    ///
    /// `offset` is the index of `records[0]` within its batch and is only used
    /// for error reporting.
    pub fn from_records(
        entity: EntityKind,
        records: &[Record],
        offset: usize,
    ) -> Result<Self, SnapshotError> {
        let Some(first) = records.first() else {
            return Ok(Self {
                columns: Vec::new(),
                rows: 0,
            });
        };
        if !first.contains_key("id") {
            return Err(SnapshotError::MissingId {
                entity,
                index: offset,
            });
        }

        let mut columns: Vec<Column> = first
            .keys()
            .map(|name| Column {
                name: name.clone(),
                values: Vec::with_capacity(records.len()),
            })
            .collect();

        for (i, record) in records.iter().enumerate() {
            if record.len() != columns.len() {
                return Err(SnapshotError::InconsistentFields {
                    entity,
                    index: offset + i,
                });
            }
            for column in &mut columns {
                let value = record.get(&column.name).ok_or_else(|| {
                    SnapshotError::InconsistentFields {
                        entity,
                        index: offset + i,
                    }
                })?;
                column.values.push(value.clone());
            }
        }

        Ok(Self {
            columns,
            rows: records.len(),
        })
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in record order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
