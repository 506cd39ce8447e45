//! chainsnap-core — offchain state snapshots with versioned migrations.
//!
//! # Architecture
//!
//! ```text
//! Exporter ──(one transaction, height checked twice)──► SnapshotStore (export.json)
//!                                                            │
//! Importer ◄─────────────────────────────────────────────────┘
//!     ├── MigrationChain   (data migrations: version < V)
//!     ├── ImportSink       (chunked bulk insert / column-array update)
//!     ├── SequenceStore    (counter migrations: version <= V)
//!     └── SnapshotStore    (rename to export.json.imported)
//! ```

pub mod catalog;
pub mod config;
pub mod counter;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod migration;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod version;

pub use catalog::{CatalogEntry, EntityKind};
pub use config::SnapshotConfig;
pub use counter::{MemorySequenceStore, NextEntityId, SequenceStore};
pub use error::SnapshotError;
pub use exporter::Exporter;
pub use importer::{AppliedBatch, ImportPlan, ImportReport, ImportState, Importer};
pub use migration::{CounterMigration, Migration, MigrationChain, MigrationContext};
pub use snapshot::{BatchMode, EntityBatch, Record, Snapshot, SnapshotData, TransposedChunk};
pub use source::{ExportSource, ExportTransaction, ImportSink};
pub use store::{Marker, SnapshotStore};
pub use version::ToolVersion;
