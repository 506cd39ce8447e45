//! chainsnap-storage — database backends for ChainSnap.
//!
//! Backends:
//! - [`memory`] — in-memory (tests and dry runs, no persistence)
//! - `postgres` — PostgreSQL via `sqlx` (feature `postgres`)
//!
//! [`sql`] builds the column-array bulk statements the Postgres backend runs.

pub mod memory;
pub mod sql;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryDatabase;
