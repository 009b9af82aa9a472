//! The outbox: an ordered list of pending operations.
//!
//! Position in the queue is creation order. Operations for different
//! entities carry no ordering constraint between them, but an operation is
//! only ready to send once every earlier operation for the same entity has
//! left the queue.

use crate::{OperationId, OperationType, PendingOperation};
use serde::{Deserialize, Serialize};

/// Ordered pending-operation list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationQueue {
    ops: Vec<PendingOperation>,
}

impl OperationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Append an operation.
    pub fn push(&mut self, op: PendingOperation) {
        self.ops.push(op);
    }

    /// Number of queued operations, conflicted ones included.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// All operations in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingOperation> {
        self.ops.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PendingOperation> {
        self.ops.iter_mut()
    }

    /// Get an operation by ID.
    pub fn get(&self, op_id: &str) -> Option<&PendingOperation> {
        self.ops.iter().find(|op| op.id == op_id)
    }

    /// Get a mutable operation by ID.
    pub fn get_mut(&mut self, op_id: &str) -> Option<&mut PendingOperation> {
        self.ops.iter_mut().find(|op| op.id == op_id)
    }

    /// Remove an operation by ID.
    pub fn remove(&mut self, op_id: &str) -> Option<PendingOperation> {
        let index = self.ops.iter().position(|op| op.id == op_id)?;
        Some(self.ops.remove(index))
    }

    /// Operations targeting an entity, in queue order.
    pub fn for_entity<'a>(
        &'a self,
        entity_id: &'a str,
    ) -> impl Iterator<Item = &'a PendingOperation> + 'a {
        self.ops.iter().filter(move |op| op.entity_id == entity_id)
    }

    /// Whether any operation still targets the entity.
    pub fn has_pending_for(&self, entity_id: &str) -> bool {
        self.ops.iter().any(|op| op.entity_id == entity_id)
    }

    /// Whether a create for the entity is still queued.
    pub fn has_create_for(&self, entity_id: &str) -> bool {
        self.for_entity(entity_id)
            .any(|op| op.operation_type == OperationType::Create)
    }

    /// True when no earlier operation for the same entity is queued.
    pub fn is_head_for_entity(&self, op_id: &str) -> bool {
        let Some(op) = self.get(op_id) else {
            return false;
        };
        self.for_entity(&op.entity_id)
            .next()
            .is_some_and(|first| first.id == op.id)
    }

    /// Remove every operation for an entity, returning them in queue order.
    pub fn remove_entity(&mut self, entity_id: &str) -> Vec<PendingOperation> {
        let (removed, kept) = std::mem::take(&mut self.ops)
            .into_iter()
            .partition(|op| op.entity_id == entity_id);
        self.ops = kept;
        removed
    }

    /// IDs of operations a sync pass should attempt, in queue order.
    /// Conflicted operations are skipped until their conflict is resolved.
    pub fn drain_order(&self) -> Vec<OperationId> {
        self.ops
            .iter()
            .filter(|op| !op.is_conflicted())
            .map(|op| op.id.clone())
            .collect()
    }

    /// Operation IDs naming the given entity.
    pub fn ids_for_entity(&self, entity_id: &str) -> Vec<OperationId> {
        self.for_entity(entity_id).map(|op| op.id.clone()).collect()
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.ops.clear();
    }
}
