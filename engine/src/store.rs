//! UserCache - the offline-first state container.
//!
//! The cache holds every recipe and brew session the user can see, plus the
//! outbox of operations the server has not accepted yet. Local mutations
//! always succeed (given a valid payload); the sync pass later reports each
//! remote outcome back through the `complete_*` / `record_*` methods.

use crate::{
    error::Result, reconcile::RewritePlan, CacheSnapshot, CachedEntity, Conflict, EntityId,
    EntityKind, EntitySchema, Error, IdRewrite, NodeId, OperationId, OperationType,
    PendingOperation, RemoteEntity, SyncStatus, Timestamp, Version,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Result of a successful remote create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The temporary ID was replaced everywhere
    Resolved(IdRewrite),
    /// The entity was deleted locally while its create was in flight; a
    /// delete for the new server ID has been queued instead
    Orphaned {
        server_id: EntityId,
        delete_op: OperationId,
    },
}

/// Result of a local delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// A remote delete was queued; the entity stays tombstoned until it succeeds
    Queued(OperationId),
    /// The entity never reached the server; it and its queued operations are gone
    Discarded { dropped_ops: usize },
}

/// Counts from merging a server listing into the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    /// Entities inserted or replaced with the server copy
    pub updated: usize,
    /// Synced entities the server no longer lists
    pub removed: usize,
    /// Entities kept because they have local work outstanding
    pub kept_local: usize,
}

/// The user cache.
#[derive(Debug, Clone, PartialEq)]
pub struct UserCache {
    snapshot: CacheSnapshot,
}

impl UserCache {
    /// Create an empty cache for a node.
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            snapshot: CacheSnapshot::new(node_id),
        }
    }

    /// Rebuild a cache from its persisted snapshot.
    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        Self { snapshot }
    }

    /// Borrow the underlying snapshot.
    pub fn snapshot(&self) -> &CacheSnapshot {
        &self.snapshot
    }

    /// Consume the cache, returning the snapshot to persist.
    pub fn into_snapshot(self) -> CacheSnapshot {
        self.snapshot
    }

    /// Get the node ID.
    pub fn node_id(&self) -> &NodeId {
        &self.snapshot.node_id
    }

    // ------------------------------------------------------------------
    // Local mutations
    // ------------------------------------------------------------------

    /// Create an entity under a fresh temporary ID and queue its create.
    pub fn create(
        &mut self,
        kind: EntityKind,
        payload: serde_json::Value,
        timestamp: Timestamp,
    ) -> Result<CachedEntity> {
        EntitySchema::for_kind(kind).validate_payload(&payload)?;

        let id = self.snapshot.sequence.next_temp_id(timestamp);
        let op_id = self.snapshot.sequence.next_op_id();
        let payload = self.canonicalize_references(kind, payload);

        let entity = CachedEntity::new_local(id.clone(), kind, payload.clone(), timestamp);
        self.snapshot.insert(entity.clone());
        self.snapshot.queue.push(PendingOperation::create(
            op_id, kind, id, payload, timestamp,
        ));

        Ok(entity)
    }

    /// Replace an entity's payload and queue an update.
    ///
    /// A temporary entity whose create was rejected gets a fresh create
    /// instead, so editing a failed item retries it.
    pub fn update(
        &mut self,
        kind: EntityKind,
        id: &str,
        payload: serde_json::Value,
        timestamp: Timestamp,
    ) -> Result<CachedEntity> {
        EntitySchema::for_kind(kind).validate_payload(&payload)?;

        let id = self.snapshot.canonical_id(id).to_string();
        let payload = self.canonicalize_references(kind, payload);
        let op_id = self.snapshot.sequence.next_op_id();
        let needs_create = crate::is_temp_id(&id) && !self.snapshot.queue.has_create_for(&id);

        let entity = self
            .snapshot
            .entities_mut(kind)
            .get_mut(&id)
            .ok_or_else(|| Error::EntityNotFound(id.clone()))?;
        if entity.deleted {
            return Err(Error::OperationOnDeleted(id));
        }
        entity.update_payload(payload.clone(), timestamp);
        let base_version = entity.version;
        let entity = entity.clone();

        let op = if needs_create {
            PendingOperation::create(op_id, kind, id, payload, timestamp)
        } else {
            PendingOperation::update(op_id, kind, id, payload, base_version, timestamp)
        };
        self.snapshot.queue.push(op);

        Ok(entity)
    }

    /// Delete an entity locally.
    pub fn delete(
        &mut self,
        kind: EntityKind,
        id: &str,
        timestamp: Timestamp,
    ) -> Result<DeleteOutcome> {
        let id = self.snapshot.canonical_id(id).to_string();

        let entity = self
            .snapshot
            .entities_mut(kind)
            .get_mut(&id)
            .ok_or_else(|| Error::EntityNotFound(id.clone()))?;
        if entity.deleted {
            return Err(Error::OperationOnDeleted(id));
        }

        if entity.is_temporary() {
            self.snapshot.entities_mut(kind).remove(&id);
            let dropped = self.snapshot.queue.remove_entity(&id);
            self.drop_conflicts_for(&id);
            return Ok(DeleteOutcome::Discarded {
                dropped_ops: dropped.len(),
            });
        }

        entity.mark_deleted(timestamp);
        let base_version = entity.version;
        let op_id = self.snapshot.sequence.next_op_id();
        self.snapshot.queue.push(PendingOperation::delete(
            op_id.clone(),
            kind,
            id,
            base_version,
            timestamp,
        ));
        Ok(DeleteOutcome::Queued(op_id))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Get an active entity, accepting an already-resolved temporary ID.
    pub fn get(&self, kind: EntityKind, id: &str) -> Option<&CachedEntity> {
        let id = self.snapshot.canonical_id(id);
        self.snapshot
            .entities(kind)
            .get(id)
            .filter(|e| e.is_active())
    }

    /// Active entities of a kind, most recently modified first.
    pub fn list(&self, kind: EntityKind) -> Vec<&CachedEntity> {
        let mut entities: Vec<_> = self
            .snapshot
            .entities(kind)
            .values()
            .filter(|e| e.is_active())
            .collect();
        entities.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.id.cmp(&b.id))
        });
        entities
    }

    /// Get count of pending operations.
    pub fn pending_count(&self) -> usize {
        self.snapshot.queue.len()
    }

    /// Get all pending operations.
    pub fn pending_ops(&self) -> impl Iterator<Item = &PendingOperation> {
        self.snapshot.queue.iter()
    }

    /// Unresolved conflicts.
    pub fn conflicts(&self) -> impl Iterator<Item = &Conflict> {
        self.snapshot.conflicts.values()
    }

    /// Number of unresolved conflicts.
    pub fn conflict_count(&self) -> usize {
        self.snapshot.conflicts.len()
    }

    /// Look up a conflict.
    pub fn conflict(&self, conflict_id: &str) -> Result<&Conflict> {
        self.snapshot
            .conflicts
            .get(conflict_id)
            .ok_or_else(|| Error::ConflictNotFound(conflict_id.to_string()))
    }

    // ------------------------------------------------------------------
    // Sync pass
    // ------------------------------------------------------------------

    /// Operation IDs to attempt, in queue order.
    pub fn drain_order(&self) -> Vec<OperationId> {
        self.snapshot.queue.drain_order()
    }

    /// The operation if it may be sent now: still queued, not held by a
    /// conflict, first in line for its entity, and not referencing another
    /// entity that has no server ID yet.
    pub fn ready_operation(&self, op_id: &str) -> Option<&PendingOperation> {
        let op = self.snapshot.queue.get(op_id)?;
        if op.is_conflicted()
            || !self.snapshot.queue.is_head_for_entity(op_id)
            || self.unresolved_reference(op).is_some()
        {
            return None;
        }
        Some(op)
    }

    /// First temporary ID the operation's payload still points at.
    pub fn unresolved_reference<'a>(&self, op: &'a PendingOperation) -> Option<&'a str> {
        let payload = op.payload.as_ref()?;
        op.entity_type.references().iter().find_map(|&(field, _)| {
            payload
                .get(field)
                .and_then(serde_json::Value::as_str)
                .filter(|id| crate::is_temp_id(id))
        })
    }

    /// First temporary ID the operation points at that can no longer
    /// resolve: the entity was discarded locally or its create was rejected,
    /// so no create is queued and no server ID was recorded.
    pub fn dangling_reference<'a>(&self, op: &'a PendingOperation) -> Option<&'a str> {
        let payload = op.payload.as_ref()?;
        op.entity_type.references().iter().find_map(|&(field, _)| {
            payload
                .get(field)
                .and_then(serde_json::Value::as_str)
                .filter(|id| {
                    crate::is_temp_id(id)
                        && !self.snapshot.queue.has_create_for(id)
                        && !self.snapshot.resolved_ids.contains_key(*id)
                })
        })
    }

    /// Drop an operation that is next in line for its entity but points at
    /// an entity that will never be created.
    ///
    /// Returns the dangling ID and the dropped operations (see
    /// [`record_rejection`](Self::record_rejection)), or `None` when the
    /// operation is not stuck on a dangling reference.
    pub fn reject_dangling(
        &mut self,
        op_id: &str,
    ) -> Result<Option<(EntityId, Vec<PendingOperation>)>> {
        let Some(op) = self.snapshot.queue.get(op_id) else {
            return Ok(None);
        };
        if op.is_conflicted() || !self.snapshot.queue.is_head_for_entity(op_id) {
            return Ok(None);
        }
        let Some(target) = self.dangling_reference(op).map(str::to_string) else {
            return Ok(None);
        };
        let dropped = self.record_rejection(op_id)?;
        Ok(Some((target, dropped)))
    }

    /// Flag the operation's entity as in flight.
    pub fn mark_syncing(&mut self, op_id: &str) -> Result<()> {
        let op = self.operation(op_id)?;
        let (kind, id) = (op.entity_type, op.entity_id.clone());
        if let Some(entity) = self.snapshot.entities_mut(kind).get_mut(&id) {
            entity.sync_status = SyncStatus::Syncing;
        }
        Ok(())
    }

    /// The server accepted a create and assigned `server_id`.
    ///
    /// Takes the operation as it was sent: by the time the response arrives
    /// the operation may already have left the queue (local delete or a
    /// cleared queue), and the server entity still has to be accounted for.
    pub fn complete_create(
        &mut self,
        op: &PendingOperation,
        server_id: impl Into<EntityId>,
        version: Version,
        timestamp: Timestamp,
    ) -> Result<CreateOutcome> {
        let server_id = server_id.into();
        let kind = op.entity_type;
        self.snapshot.queue.remove(&op.id);

        if !self.snapshot.entities(kind).contains_key(&op.entity_id) {
            // Deleted locally while the create was in flight.
            let delete_op = self.snapshot.sequence.next_op_id();
            self.snapshot.queue.push(PendingOperation::delete(
                delete_op.clone(),
                kind,
                server_id.clone(),
                Some(version),
                timestamp,
            ));
            self.snapshot
                .resolved_ids
                .insert(op.entity_id.clone(), server_id.clone());
            return Ok(CreateOutcome::Orphaned {
                server_id,
                delete_op,
            });
        }

        let rewrite = IdRewrite {
            kind,
            temp_id: op.entity_id.clone(),
            server_id: server_id.clone(),
        };
        if op.entity_id != server_id {
            RewritePlan::plan(&self.snapshot, rewrite.clone()).apply(&mut self.snapshot)?;
        }

        if let Some(entity) = self.snapshot.entities_mut(kind).get_mut(&server_id) {
            entity.version = Some(version);
        }
        self.rebase_queued(&server_id, version);
        self.settle(kind, &server_id);
        Ok(CreateOutcome::Resolved(rewrite))
    }

    /// The server accepted an update.
    pub fn complete_update(&mut self, op: &PendingOperation, version: Version) {
        self.snapshot.queue.remove(&op.id);
        if let Some(entity) = self
            .snapshot
            .entities_mut(op.entity_type)
            .get_mut(&op.entity_id)
        {
            entity.version = Some(version);
        }
        self.rebase_queued(&op.entity_id, version);
        self.settle(op.entity_type, &op.entity_id);
    }

    /// The server accepted a delete (or the entity was already gone).
    pub fn complete_delete(&mut self, op: &PendingOperation) {
        self.snapshot.queue.remove(&op.id);
        if self.snapshot.queue.has_pending_for(&op.entity_id) {
            self.settle(op.entity_type, &op.entity_id);
        } else {
            self.snapshot
                .entities_mut(op.entity_type)
                .remove(&op.entity_id);
        }
    }

    /// A network-class failure: keep the operation queued for the next pass.
    pub fn record_retry(&mut self, op_id: &str) -> Result<u32> {
        let op = self
            .snapshot
            .queue
            .get_mut(op_id)
            .ok_or_else(|| Error::OperationNotFound(op_id.to_string()))?;
        op.attempts = op.attempts.saturating_add(1);
        let attempts = op.attempts;
        let (kind, id) = (op.entity_type, op.entity_id.clone());
        if let Some(entity) = self.snapshot.entities_mut(kind).get_mut(&id) {
            entity.sync_status = SyncStatus::Pending;
        }
        Ok(attempts)
    }

    /// Put the entity back to pending without counting an attempt.
    pub fn release(&mut self, op_id: &str) -> Result<()> {
        let op = self.operation(op_id)?;
        let (kind, id) = (op.entity_type, op.entity_id.clone());
        self.settle(kind, &id);
        Ok(())
    }

    /// A validation-class failure: drop the operation permanently.
    ///
    /// Returns the rejected operation followed by any later operations for
    /// the same entity that can no longer be delivered because the entity
    /// never obtained a server ID.
    pub fn record_rejection(&mut self, op_id: &str) -> Result<Vec<PendingOperation>> {
        let op = self.take_operation(op_id)?;
        let (kind, id) = (op.entity_type, op.entity_id.clone());

        let mut dropped = vec![op];
        if crate::is_temp_id(&id) && !self.snapshot.queue.has_create_for(&id) {
            dropped.extend(self.snapshot.queue.remove_entity(&id));
        }

        if let Some(entity) = self.snapshot.entities_mut(kind).get_mut(&id) {
            if dropped[0].operation_type == OperationType::Delete {
                entity.deleted = false;
            }
            entity.sync_status = SyncStatus::Failed;
        }
        Ok(dropped)
    }

    /// The server's copy diverged from the version the change was built on.
    /// The operation stays queued but is skipped until resolved.
    pub fn record_conflict(
        &mut self,
        op_id: &str,
        remote_version: Option<Version>,
        timestamp: Timestamp,
    ) -> Result<Conflict> {
        let conflict_id = self.snapshot.sequence.next_conflict_id();
        let op = self
            .snapshot
            .queue
            .get_mut(op_id)
            .ok_or_else(|| Error::OperationNotFound(op_id.to_string()))?;
        op.conflict_id = Some(conflict_id.clone());

        let conflict = Conflict {
            id: conflict_id.clone(),
            entity_type: op.entity_type,
            entity_id: op.entity_id.clone(),
            operation_id: op.id.clone(),
            local_base_version: op.base_version,
            remote_version,
            detected_at: timestamp,
        };
        if let Some(entity) = self
            .snapshot
            .entities_mut(conflict.entity_type)
            .get_mut(&conflict.entity_id)
        {
            entity.sync_status = SyncStatus::Failed;
        }
        self.snapshot
            .conflicts
            .insert(conflict_id, conflict.clone());
        Ok(conflict)
    }

    /// Discard every queued operation and recorded conflict.
    /// Cached entities are left as they are.
    pub fn clear_queue(&mut self) -> usize {
        let cleared = self.snapshot.queue.len();
        self.snapshot.queue.clear();
        self.snapshot.conflicts.clear();
        cleared
    }

    // ------------------------------------------------------------------
    // Server listings
    // ------------------------------------------------------------------

    /// Merge the server's listing of a kind into the cache.
    ///
    /// Entities with queued operations or a local tombstone keep their local
    /// copy. Synced entities missing from the listing are dropped.
    pub fn merge_remote(
        &mut self,
        kind: EntityKind,
        remote: Vec<RemoteEntity>,
        timestamp: Timestamp,
    ) -> MergeSummary {
        let mut summary = MergeSummary::default();
        let listed: BTreeSet<EntityId> = remote.iter().map(|r| r.id.clone()).collect();

        for item in remote {
            if self.has_local_work(kind, &item.id) {
                summary.kept_local += 1;
                continue;
            }
            self.snapshot
                .insert(CachedEntity::from_remote(kind, item, timestamp));
            summary.updated += 1;
        }

        let stale: Vec<EntityId> = self
            .snapshot
            .entities(kind)
            .values()
            .filter(|e| !e.is_temporary() && !listed.contains(&e.id))
            .filter(|e| !self.snapshot.queue.has_pending_for(&e.id))
            .map(|e| e.id.clone())
            .collect();
        for id in stale {
            self.snapshot.entities_mut(kind).remove(&id);
            summary.removed += 1;
        }

        summary
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn operation(&self, op_id: &str) -> Result<&PendingOperation> {
        self.snapshot
            .queue
            .get(op_id)
            .ok_or_else(|| Error::OperationNotFound(op_id.to_string()))
    }

    fn take_operation(&mut self, op_id: &str) -> Result<PendingOperation> {
        self.snapshot
            .queue
            .remove(op_id)
            .ok_or_else(|| Error::OperationNotFound(op_id.to_string()))
    }

    fn has_local_work(&self, kind: EntityKind, id: &str) -> bool {
        self.snapshot.queue.has_pending_for(id)
            || self
                .snapshot
                .entities(kind)
                .get(id)
                .is_some_and(|e| e.deleted || e.sync_status == SyncStatus::Failed)
    }

    /// Later queued operations for the entity were built on the version the
    /// server just confirmed; carry the new version forward.
    fn rebase_queued(&mut self, entity_id: &str, version: Version) {
        for op in self.snapshot.queue.iter_mut() {
            if op.entity_id == entity_id && op.operation_type != OperationType::Create {
                op.base_version = Some(version);
            }
        }
    }

    fn settle(&mut self, kind: EntityKind, id: &str) {
        let outstanding = self.snapshot.queue.has_pending_for(id);
        if let Some(entity) = self.snapshot.entities_mut(kind).get_mut(id) {
            entity.sync_status = if outstanding {
                SyncStatus::Pending
            } else {
                SyncStatus::Synced
            };
        }
    }

    fn drop_conflicts_for(&mut self, entity_id: &str) {
        self.snapshot
            .conflicts
            .retain(|_, c| c.entity_id != entity_id);
    }

    /// Rewrite reference fields naming an already-resolved temporary ID.
    fn canonicalize_references(
        &self,
        kind: EntityKind,
        mut payload: serde_json::Value,
    ) -> serde_json::Value {
        for &(field, _) in kind.references() {
            let resolved = payload
                .get(field)
                .and_then(serde_json::Value::as_str)
                .and_then(|id| self.snapshot.resolved_ids.get(id))
                .cloned();
            if let (Some(resolved), Some(obj)) = (resolved, payload.as_object_mut()) {
                obj.insert(field.to_string(), serde_json::Value::String(resolved));
            }
        }
        payload
    }
}
