//! Entity catalog — which entities are carried by a snapshot, and how.
//!
//! `insert` entities are exported as full rows and re-inserted on import.
//! `update` entities only carry `id` plus a small set of offchain fields that
//! are merged into rows the chain processor has already (re)created.
//!
//! Catalog order is import order, so referenced parents (`User`, `Account`)
//! come before the rows that point at them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::snapshot::BatchMode;

/// Every entity type eligible for snapshotting.
///
/// The derived `Ord` follows declaration order, which is the catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    Account,
    Session,
    EncryptionArtifacts,
    SessionEncryptionArtifacts,
    Token,
    GatewayConfig,
    VideoViewEvent,
    ChannelFollow,
    Report,
    NftFeaturingRequest,
    VideoHero,
    VideoFeaturedInCategory,
    Channel,
    Video,
    Comment,
    OwnedNft,
    VideoCategory,
}

impl EntityKind {
    /// All entity kinds, in catalog order.
    pub const ALL: [EntityKind; 18] = [
        Self::User,
        Self::Account,
        Self::Session,
        Self::EncryptionArtifacts,
        Self::SessionEncryptionArtifacts,
        Self::Token,
        Self::GatewayConfig,
        Self::VideoViewEvent,
        Self::ChannelFollow,
        Self::Report,
        Self::NftFeaturingRequest,
        Self::VideoHero,
        Self::VideoFeaturedInCategory,
        Self::Channel,
        Self::Video,
        Self::Comment,
        Self::OwnedNft,
        Self::VideoCategory,
    ];

    /// Entity name as it appears in snapshot files and sequence state.
    pub fn name(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Account => "Account",
            Self::Session => "Session",
            Self::EncryptionArtifacts => "EncryptionArtifacts",
            Self::SessionEncryptionArtifacts => "SessionEncryptionArtifacts",
            Self::Token => "Token",
            Self::GatewayConfig => "GatewayConfig",
            Self::VideoViewEvent => "VideoViewEvent",
            Self::ChannelFollow => "ChannelFollow",
            Self::Report => "Report",
            Self::NftFeaturingRequest => "NftFeaturingRequest",
            Self::VideoHero => "VideoHero",
            Self::VideoFeaturedInCategory => "VideoFeaturedInCategory",
            Self::Channel => "Channel",
            Self::Video => "Video",
            Self::Comment => "Comment",
            Self::OwnedNft => "OwnedNft",
            Self::VideoCategory => "VideoCategory",
        }
    }

    /// Backing table name (snake_case, unqualified).
    pub fn table_name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Account => "account",
            Self::Session => "session",
            Self::EncryptionArtifacts => "encryption_artifacts",
            Self::SessionEncryptionArtifacts => "session_encryption_artifacts",
            Self::Token => "token",
            Self::GatewayConfig => "gateway_config",
            Self::VideoViewEvent => "video_view_event",
            Self::ChannelFollow => "channel_follow",
            Self::Report => "report",
            Self::NftFeaturingRequest => "nft_featuring_request",
            Self::VideoHero => "video_hero",
            Self::VideoFeaturedInCategory => "video_featured_in_category",
            Self::Channel => "channel",
            Self::Video => "video",
            Self::Comment => "comment",
            Self::OwnedNft => "owned_nft",
            Self::VideoCategory => "video_category",
        }
    }

    /// The catalog entry describing how this entity is snapshotted.
    pub fn catalog_entry(self) -> CatalogEntry {
        match self {
            Self::Channel => {
                CatalogEntry::Update(self, &["is_excluded", "video_views_num", "follows_num"])
            }
            Self::Video => CatalogEntry::Update(self, &["is_excluded", "views_num"]),
            Self::Comment => CatalogEntry::Update(self, &["is_excluded"]),
            Self::OwnedNft => CatalogEntry::Update(self, &["is_featured"]),
            Self::VideoCategory => CatalogEntry::Update(self, &["is_supported"]),
            _ => CatalogEntry::Insert(self),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a single entity is exported and imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogEntry {
    /// Full rows, re-inserted on import.
    Insert(EntityKind),
    /// `id` plus the named columns, merged into existing rows on import.
    Update(EntityKind, &'static [&'static str]),
}

impl CatalogEntry {
    pub fn entity(&self) -> EntityKind {
        match *self {
            Self::Insert(kind) | Self::Update(kind, _) => kind,
        }
    }

    pub fn mode(&self) -> BatchMode {
        match self {
            Self::Insert(_) => BatchMode::Insert,
            Self::Update(..) => BatchMode::Update,
        }
    }

    /// Merged columns for `update` entries (excluding `id`); `None` for inserts.
    pub fn fields(&self) -> Option<&'static [&'static str]> {
        match *self {
            Self::Insert(_) => None,
            Self::Update(_, fields) => Some(fields),
        }
    }
}

/// Iterate the whole catalog in import order.
pub fn catalog() -> impl Iterator<Item = CatalogEntry> {
    EntityKind::ALL.into_iter().map(EntityKind::catalog_entry)
}
