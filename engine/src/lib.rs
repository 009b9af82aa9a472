//! # brewsync engine
//!
//! The deterministic core of the brewing companion's offline-first data layer.
//!
//! This crate holds everything about the local cache that can be expressed
//! without IO: cached entities (recipes and brew sessions), the outbox of
//! pending operations, temporary-ID resolution, conflict records, the
//! persisted snapshot format, static reference-data snapshots, and the
//! derived sync-status view shown by the UI.
//!
//! ## Design Principles
//!
//! - **No IO**: storage, network and connectivity live in `brewsync-client`
//! - **Deterministic**: the same snapshot and inputs always produce the same state
//! - **Single composite record**: entities, queue and conflicts persist as one
//!   [`CacheSnapshot`], so a temporary-ID rewrite is one read-modify-write
//!
//! ## Core Concepts
//!
//! ### Entities
//!
//! A [`CachedEntity`] is created locally with a temporary ID (prefixed
//! [`TEMP_ID_PREFIX`]) and keeps it until the first successful remote create
//! hands back a server ID.
//!
//! ### Outbox
//!
//! Every local mutation appends a [`PendingOperation`] to the
//! [`OperationQueue`]. Operations for one entity are replayed strictly in
//! creation order; [`UserCache::ready_operation`] refuses to hand out an
//! operation while an earlier one for the same entity is still queued.
//!
//! ### Temporary-ID resolution
//!
//! [`RewritePlan`] computes the full set of places naming a temporary ID
//! (the entity, queued operations, cross-entity references, conflicts)
//! before touching any of them.
//!
//! ## Quick Start
//!
//! ```rust
//! use brewsync_engine::{EntityKind, UserCache};
//! use serde_json::json;
//!
//! let mut cache = UserCache::new("device_1");
//! let recipe = cache
//!     .create(EntityKind::Recipe, json!({"name": "Citra Pale Ale"}), 1_706_745_600_000)
//!     .unwrap();
//! assert!(recipe.is_temporary());
//! assert_eq!(cache.pending_count(), 1);
//!
//! let op = cache.pending_ops().next().unwrap().clone();
//! cache
//!     .complete_create(&op, "rcp_42", 1, 1_706_745_601_000)
//!     .unwrap();
//! assert!(cache.get(EntityKind::Recipe, "rcp_42").is_some());
//! assert_eq!(cache.pending_count(), 0);
//! ```

pub mod entity;
pub mod error;
pub mod operation;
pub mod queue;
pub mod reconcile;
pub mod schema;
pub mod sequence;
pub mod snapshot;
pub mod static_data;
pub mod status;
pub mod store;

// Re-export main types at crate root
pub use entity::{is_temp_id, CachedEntity, EntityKind, RemoteEntity, SyncStatus};
pub use error::Error;
pub use operation::{OperationId, OperationType, PendingOperation};
pub use queue::OperationQueue;
pub use reconcile::{Conflict, ConflictId, ConflictResolution, IdRewrite, RewritePlan};
pub use schema::{EntitySchema, FieldDef};
pub use sequence::OpSequence;
pub use snapshot::{CacheSnapshot, SnapshotMetadata, SNAPSHOT_FORMAT_VERSION};
pub use static_data::{
    BeerStyleFilter, IngredientFilter, StaticDataSnapshot, StaticDataset, StaticVersions,
    UpdateCheck,
};
pub use status::{StatusColor, StatusView, SyncState};
pub use store::{CreateOutcome, DeleteOutcome, MergeSummary, UserCache};

/// Type aliases for clarity
pub type EntityId = String;
pub type NodeId = String;
pub type Version = u64;
pub type Timestamp = u64;

/// Prefix carried by every client-generated entity ID.
pub const TEMP_ID_PREFIX: &str = "temp_";
