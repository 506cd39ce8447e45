//! Migration chain — upgrades snapshot data written by older tool versions.
//!
//! Two lists are kept, both ordered by [`ToolVersion`]:
//! - data migrations fire when `snapshot version < migration version`
//! - counter migrations fire when `snapshot version <= migration version`
//!
//! The inclusive counter threshold is deliberate; a counter migration and a
//! data migration tagged with the same release both fire for that release.
//!
//! Transforms are deterministic in their inputs: re-running the chain over
//! the same snapshot yields the same data, so a retried import converges.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::catalog::EntityKind;
use crate::error::SnapshotError;
use crate::snapshot::{EntityBatch, Record, Snapshot, SnapshotData};
use crate::version::ToolVersion;

/// Rewrites snapshot data from the previous logical schema to the next one.
pub type MigrationFn = fn(SnapshotData, &MigrationContext) -> SnapshotData;

/// What a transform knows about the snapshot being migrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationContext {
    /// Block number recorded in the snapshot.
    pub block_number: u64,
    /// Version of the tool that wrote the snapshot.
    pub source_version: ToolVersion,
    /// Name-based UUID over the snapshot contents. Identical files give
    /// identical fingerprints; use it to derive ids for synthesized records.
    pub fingerprint: Uuid,
}

impl MigrationContext {
    pub fn new(block_number: u64, source_version: ToolVersion, fingerprint: Uuid) -> Self {
        Self {
            block_number,
            source_version,
            fingerprint,
        }
    }

    /// Context for migrating `snapshot`, fingerprinted over its serialized form.
    pub fn for_snapshot(snapshot: &Snapshot) -> Result<Self, SnapshotError> {
        let bytes = serde_json::to_vec(snapshot)?;
        Ok(Self::new(
            snapshot.block_number,
            snapshot.tool_version,
            Uuid::new_v5(&Uuid::NAMESPACE_OID, &bytes),
        ))
    }
}

/// A data migration tagged with the release that introduced it.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: ToolVersion,
    pub transform: MigrationFn,
}

/// Entities whose next-id counter must be recomputed after import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterMigration {
    pub version: ToolVersion,
    pub entities: Vec<EntityKind>,
}

/// Ordered data and counter migrations.
#[derive(Debug, Clone, Default)]
pub struct MigrationChain {
    migrations: Vec<Migration>,
    counters: Vec<CounterMigration>,
}

impl MigrationChain {
    /// An empty chain (no migrations at all).
    pub fn new() -> Self {
        Self::default()
    }

    /// The migrations shipped with this release.
    pub fn builtin() -> Self {
        Self::new()
            .with_migration("3.0.0", migrate_to_v300)
            .with_counters("3.0.1", [EntityKind::Account])
    }

    /// Register a data migration; the chain stays sorted by version.
    pub fn with_migration(mut self, version: &str, transform: MigrationFn) -> Self {
        self.migrations.push(Migration {
            version: ToolVersion::parse(version),
            transform,
        });
        // stable: equal versions keep registration order
        self.migrations.sort_by_key(|m| m.version);
        self
    }

    /// Register a counter migration; the chain stays sorted by version.
    pub fn with_counters(
        mut self,
        version: &str,
        entities: impl IntoIterator<Item = EntityKind>,
    ) -> Self {
        self.counters.push(CounterMigration {
            version: ToolVersion::parse(version),
            entities: entities.into_iter().collect(),
        });
        self.counters.sort_by_key(|c| c.version);
        self
    }

    /// Data migrations that apply to a snapshot written by `from`, in order.
    pub fn pending(&self, from: ToolVersion) -> impl Iterator<Item = &Migration> {
        self.migrations.iter().filter(move |m| from < m.version)
    }

    /// Counter migrations that apply to a snapshot written by `from`, in order.
    pub fn pending_counters(&self, from: ToolVersion) -> impl Iterator<Item = &CounterMigration> {
        self.counters.iter().filter(move |c| from <= c.version)
    }

    /// Thread `data` through every data migration pending for
    /// `ctx.source_version`.
    pub fn apply(&self, ctx: &MigrationContext, data: SnapshotData) -> SnapshotData {
        self.pending(ctx.source_version).fold(data, |data, migration| {
            info!(version = %migration.version, "Migrating export data");
            (migration.transform)(data, ctx)
        })
    }
}

// ─── 3.0.0 ────────────────────────────────────────────────────────────────────

/// Id prefix of the placeholder user that owns migrated anonymous records.
pub const V2_MIGRATION_USER_PREFIX: &str = "v2-migration-";

/// 3.0.0 ties offchain records to users instead of IP addresses.
///
/// A placeholder user is synthesized and every record that carried an `ip`
/// is reassigned to it. Channel follows now require an account, so old
/// follows are dropped and follower counters reset.
///
/// The placeholder id derives from the snapshot fingerprint, so a retried
/// import reuses the user inserted by the failed attempt.
pub fn migrate_to_v300(mut data: SnapshotData, ctx: &MigrationContext) -> SnapshotData {
    let user_id = format!("{V2_MIGRATION_USER_PREFIX}{}", ctx.fingerprint.simple());
    let mut user = Record::new();
    user.insert("id".into(), Value::String(user_id.clone()));
    user.insert("is_root".into(), Value::Bool(false));
    data.insert(EntityKind::User, EntityBatch::insert(vec![user]));

    for kind in [
        EntityKind::VideoViewEvent,
        EntityKind::Report,
        EntityKind::NftFeaturingRequest,
    ] {
        if let Some(batch) = data.get_mut(&kind) {
            for record in &mut batch.values {
                record.remove("ip");
                record.insert("user_id".into(), json!(user_id));
            }
        }
    }

    data.remove(&EntityKind::ChannelFollow);
    if let Some(channels) = data.get_mut(&EntityKind::Channel) {
        for record in &mut channels.values {
            record.insert("follows_num".into(), json!(0));
        }
    }
    data
}
