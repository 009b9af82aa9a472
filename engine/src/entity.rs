//! Cached domain entities.

use crate::{EntityId, Timestamp, Version, TEMP_ID_PREFIX};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of user-owned entity held in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Recipe,
    BrewSession,
}

impl EntityKind {
    /// Every entity kind, in dependency order (recipes before the sessions
    /// that reference them).
    pub const ALL: [EntityKind; 2] = [EntityKind::Recipe, EntityKind::BrewSession];

    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Recipe => "recipe",
            EntityKind::BrewSession => "brewSession",
        }
    }

    /// Payload fields of this kind that hold the ID of another entity.
    pub fn references(&self) -> &'static [(&'static str, EntityKind)] {
        match self {
            EntityKind::Recipe => &[],
            EntityKind::BrewSession => &[("recipe_id", EntityKind::Recipe)],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync state of a single cached entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local changes are queued
    Pending,
    /// An operation for this entity is in flight
    Syncing,
    /// Local copy matches the server
    Synced,
    /// The server rejected a change, or a conflict is unresolved
    Failed,
}

/// Returns true for client-generated IDs the server has never seen.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// A recipe or brew session held in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntity {
    /// Temporary or server ID
    pub id: EntityId,
    /// Entity kind
    pub kind: EntityKind,
    /// Sync state
    pub sync_status: SyncStatus,
    /// Last local mutation (milliseconds since epoch)
    pub last_modified: Timestamp,
    /// Server version this copy is based on; `None` until first created remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    /// Local tombstone, set until the remote delete succeeds
    #[serde(default)]
    pub deleted: bool,
    /// Temporary ID this entity was created under, kept after resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<EntityId>,
    /// Domain data, opaque to the cache
    pub payload: serde_json::Value,
}

impl CachedEntity {
    /// A freshly created local entity.
    pub fn new_local(
        id: impl Into<EntityId>,
        kind: EntityKind,
        payload: serde_json::Value,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            sync_status: SyncStatus::Pending,
            last_modified: timestamp,
            version: None,
            deleted: false,
            temp_id: None,
            payload,
        }
    }

    /// An entity received from the server.
    pub fn from_remote(kind: EntityKind, remote: RemoteEntity, timestamp: Timestamp) -> Self {
        Self {
            id: remote.id,
            kind,
            sync_status: SyncStatus::Synced,
            last_modified: timestamp,
            version: Some(remote.version),
            deleted: false,
            temp_id: None,
            payload: remote.data,
        }
    }

    /// Whether the ID is still client-generated.
    pub fn is_temporary(&self) -> bool {
        is_temp_id(&self.id)
    }

    /// Not tombstoned.
    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    /// Replace the payload after a local edit.
    pub fn update_payload(&mut self, payload: serde_json::Value, timestamp: Timestamp) {
        self.payload = payload;
        self.touch(timestamp);
    }

    /// Tombstone after a local delete.
    pub fn mark_deleted(&mut self, timestamp: Timestamp) {
        self.deleted = true;
        self.touch(timestamp);
    }

    fn touch(&mut self, timestamp: Timestamp) {
        self.last_modified = self.last_modified.max(timestamp);
        self.sync_status = SyncStatus::Pending;
    }

    /// The ID stored in a reference field of the payload, if any.
    pub fn reference(&self, field: &str) -> Option<&str> {
        self.payload.get(field)?.as_str()
    }
}

/// An entity as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntity {
    /// Server-assigned ID
    pub id: EntityId,
    /// Server version after the mutation
    #[serde(default)]
    pub version: Version,
    /// Domain data as stored on the server
    #[serde(default)]
    pub data: serde_json::Value,
}
