//! Pending operations queued for the remote.
//!
//! Local mutations are never sent directly; each one becomes a
//! [`PendingOperation`] that the sync pass replays against the server.

use crate::{ConflictId, EntityId, EntityKind, Timestamp, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an operation.
pub type OperationId = String;

/// What the operation does to the remote entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Create => f.write_str("create"),
            OperationType::Update => f.write_str("update"),
            OperationType::Delete => f.write_str("delete"),
        }
    }
}

/// An enqueued intent to mutate remote state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Operation ID
    pub id: OperationId,
    /// Kind of the target entity
    pub entity_type: EntityKind,
    /// Target entity ID; rewritten when a temporary ID is resolved
    pub entity_id: EntityId,
    /// Create, update or delete
    pub operation_type: OperationType,
    /// Data to send; absent for deletes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Server version the mutation was built on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<Version>,
    /// When the operation was enqueued
    pub created_at: Timestamp,
    /// Failed delivery attempts
    #[serde(default)]
    pub attempts: u32,
    /// Set while the operation is held by an unresolved conflict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_id: Option<ConflictId>,
}

impl PendingOperation {
    /// A create operation.
    pub fn create(
        id: impl Into<OperationId>,
        entity_type: EntityKind,
        entity_id: impl Into<EntityId>,
        payload: serde_json::Value,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type,
            entity_id: entity_id.into(),
            operation_type: OperationType::Create,
            payload: Some(payload),
            base_version: None,
            created_at,
            attempts: 0,
            conflict_id: None,
        }
    }

    /// An update operation.
    pub fn update(
        id: impl Into<OperationId>,
        entity_type: EntityKind,
        entity_id: impl Into<EntityId>,
        payload: serde_json::Value,
        base_version: Option<Version>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type,
            entity_id: entity_id.into(),
            operation_type: OperationType::Update,
            payload: Some(payload),
            base_version,
            created_at,
            attempts: 0,
            conflict_id: None,
        }
    }

    /// A delete operation.
    pub fn delete(
        id: impl Into<OperationId>,
        entity_type: EntityKind,
        entity_id: impl Into<EntityId>,
        base_version: Option<Version>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type,
            entity_id: entity_id.into(),
            operation_type: OperationType::Delete,
            payload: None,
            base_version,
            created_at,
            attempts: 0,
            conflict_id: None,
        }
    }

    /// Held back by an unresolved conflict.
    pub fn is_conflicted(&self) -> bool {
        self.conflict_id.is_some()
    }

    /// Payload to send, `null` for deletes.
    pub fn payload_or_null(&self) -> serde_json::Value {
        self.payload.clone().unwrap_or(serde_json::Value::Null)
    }
}
