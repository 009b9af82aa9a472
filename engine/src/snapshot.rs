//! The persisted form of the user cache.
//!
//! Entities, the operation queue and unresolved conflicts are stored together
//! as one record. The local key-value store has no multi-key transactions,
//! so keeping them in one value is what makes a temporary-ID rewrite atomic.

use crate::{
    error::Result, CachedEntity, Conflict, ConflictId, EntityId, EntityKind, Error, NodeId,
    OpSequence, OperationQueue,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time snapshot of the user cache.
///
/// Uses BTreeMap instead of HashMap for deterministic serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Node ID of the owning device
    pub node_id: NodeId,
    /// Identifier sequence
    pub sequence: OpSequence,
    /// Cached recipes by ID
    #[serde(default)]
    pub recipes: BTreeMap<EntityId, CachedEntity>,
    /// Cached brew sessions by ID
    #[serde(default)]
    pub brew_sessions: BTreeMap<EntityId, CachedEntity>,
    /// Operations not yet accepted by the server
    #[serde(default)]
    pub queue: OperationQueue,
    /// Conflicts awaiting resolution
    #[serde(default)]
    pub conflicts: BTreeMap<ConflictId, Conflict>,
    /// Temporary IDs already replaced, mapped to their server IDs
    #[serde(default)]
    pub resolved_ids: BTreeMap<EntityId, EntityId>,
}

impl CacheSnapshot {
    /// Create a new empty snapshot.
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        let node_id = node_id.into();
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            node_id: node_id.clone(),
            sequence: OpSequence::new(node_id),
            recipes: BTreeMap::new(),
            brew_sessions: BTreeMap::new(),
            queue: OperationQueue::new(),
            conflicts: BTreeMap::new(),
            resolved_ids: BTreeMap::new(),
        }
    }

    /// Entities of one kind.
    pub fn entities(&self, kind: EntityKind) -> &BTreeMap<EntityId, CachedEntity> {
        match kind {
            EntityKind::Recipe => &self.recipes,
            EntityKind::BrewSession => &self.brew_sessions,
        }
    }

    /// Mutable entities of one kind.
    pub fn entities_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<EntityId, CachedEntity> {
        match kind {
            EntityKind::Recipe => &mut self.recipes,
            EntityKind::BrewSession => &mut self.brew_sessions,
        }
    }

    /// Add or replace an entity.
    pub fn insert(&mut self, entity: CachedEntity) {
        self.entities_mut(entity.kind)
            .insert(entity.id.clone(), entity);
    }

    /// Follow the temp-to-server mapping for an ID that may already be resolved.
    pub fn canonical_id<'a>(&'a self, id: &'a str) -> &'a str {
        self.resolved_ids.get(id).map_or(id, String::as_str)
    }

    /// Count entities across both kinds, tombstones included.
    pub fn entity_count(&self) -> usize {
        self.recipes.len() + self.brew_sessions.len()
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }

    /// Summary counts without the full data.
    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata::from(self)
    }
}

/// Metadata about a snapshot (without the full data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    /// Snapshot format version
    pub format_version: u32,
    /// Node ID
    pub node_id: NodeId,
    /// Active recipes
    pub recipe_count: usize,
    /// Active brew sessions
    pub brew_session_count: usize,
    /// Entities still carrying a temporary ID
    pub temporary_count: usize,
    /// Queued operations
    pub pending_count: usize,
    /// Unresolved conflicts
    pub conflict_count: usize,
}

impl From<&CacheSnapshot> for SnapshotMetadata {
    fn from(snapshot: &CacheSnapshot) -> Self {
        let active = |map: &BTreeMap<EntityId, CachedEntity>| {
            map.values().filter(|e| e.is_active()).count()
        };
        Self {
            format_version: snapshot.format_version,
            node_id: snapshot.node_id.clone(),
            recipe_count: active(&snapshot.recipes),
            brew_session_count: active(&snapshot.brew_sessions),
            temporary_count: snapshot
                .recipes
                .values()
                .chain(snapshot.brew_sessions.values())
                .filter(|e| e.is_temporary())
                .count(),
            pending_count: snapshot.queue.len(),
            conflict_count: snapshot.conflicts.len(),
        }
    }
}
