//! Reconciliation of local state with server responses.
//!
//! Two things happen here:
//!
//! 1. **Temporary-ID resolution.** When the server accepts a create it hands
//!    back a permanent ID. Every place in the cache naming the temporary ID
//!    is collected into a [`RewritePlan`] first, then rewritten in one pass
//!    over a single [`CacheSnapshot`]; nothing is left half temporary.
//! 2. **Conflict records.** When the server reports that an entity moved on
//!    past the version a local change was built on, a [`Conflict`] is kept
//!    for later resolution. Nothing is merged automatically.

use crate::{
    error::Result, CacheSnapshot, EntityId, EntityKind, Error, OperationId, Timestamp, Version,
};
use serde::{Deserialize, Serialize};

/// Unique identifier for a conflict.
pub type ConflictId = String;

/// How a conflict should be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictResolution {
    /// Keep the local change and overwrite the server
    LocalWins,
    /// Drop the local change and take the server copy
    RemoteWins,
    /// Combine both
    Merge,
}

/// A remote-state mismatch detected during sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Conflict ID
    pub id: ConflictId,
    /// Kind of the affected entity
    pub entity_type: EntityKind,
    /// Affected entity
    pub entity_id: EntityId,
    /// Operation held back by this conflict
    pub operation_id: OperationId,
    /// Version the local change was built on
    pub local_base_version: Option<Version>,
    /// Version the server reported
    pub remote_version: Option<Version>,
    /// When the conflict was detected
    pub detected_at: Timestamp,
}

/// Replacement of a temporary ID by a server ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdRewrite {
    /// Kind of the entity being renamed
    pub kind: EntityKind,
    /// Client-generated ID
    pub temp_id: EntityId,
    /// Server-assigned ID
    pub server_id: EntityId,
}

/// Every location naming a temporary ID, computed before any is changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewritePlan {
    rewrite: IdRewrite,
    /// The entity record itself is keyed by the temporary ID
    entity: bool,
    /// Queued operations targeting the entity
    operations: Vec<OperationId>,
    /// Cached entities referencing it through a payload field
    entity_references: Vec<(EntityKind, EntityId, &'static str)>,
    /// Queued operations whose payload references it
    payload_references: Vec<(OperationId, &'static str)>,
    /// Unresolved conflicts naming it
    conflicts: Vec<ConflictId>,
}

impl RewritePlan {
    /// Collect the rewrite set for `rewrite` without modifying the snapshot.
    pub fn plan(snapshot: &CacheSnapshot, rewrite: IdRewrite) -> Self {
        let temp_id = rewrite.temp_id.as_str();
        let entity = snapshot.entities(rewrite.kind).contains_key(temp_id);

        let operations = snapshot.queue.ids_for_entity(temp_id);

        let mut entity_references = Vec::new();
        let mut payload_references = Vec::new();
        for kind in EntityKind::ALL {
            for &(field, target) in kind.references() {
                if target != rewrite.kind {
                    continue;
                }
                for candidate in snapshot.entities(kind).values() {
                    if candidate.reference(field) == Some(temp_id) {
                        entity_references.push((kind, candidate.id.clone(), field));
                    }
                }
                for op in snapshot.queue.iter().filter(|op| op.entity_type == kind) {
                    let named = op
                        .payload
                        .as_ref()
                        .and_then(|p| p.get(field))
                        .and_then(serde_json::Value::as_str);
                    if named == Some(temp_id) {
                        payload_references.push((op.id.clone(), field));
                    }
                }
            }
        }

        let conflicts = snapshot
            .conflicts
            .values()
            .filter(|c| c.entity_type == rewrite.kind && c.entity_id == temp_id)
            .map(|c| c.id.clone())
            .collect();

        Self {
            rewrite,
            entity,
            operations,
            entity_references,
            payload_references,
            conflicts,
        }
    }

    /// The rewrite this plan carries out.
    pub fn rewrite(&self) -> &IdRewrite {
        &self.rewrite
    }

    /// Number of locations that will change.
    pub fn len(&self) -> usize {
        usize::from(self.entity)
            + self.operations.len()
            + self.entity_references.len()
            + self.payload_references.len()
            + self.conflicts.len()
    }

    /// Check if nothing names the temporary ID.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply the plan to the snapshot it was computed from.
    pub fn apply(self, snapshot: &mut CacheSnapshot) -> Result<()> {
        let IdRewrite {
            kind,
            temp_id,
            server_id,
        } = self.rewrite;

        if self.entity {
            let mut entity = snapshot
                .entities_mut(kind)
                .remove(&temp_id)
                .ok_or_else(|| Error::EntityNotFound(temp_id.clone()))?;
            entity.id = server_id.clone();
            entity.temp_id = Some(temp_id.clone());
            snapshot.insert(entity);
        }

        for op_id in &self.operations {
            let op = snapshot
                .queue
                .get_mut(op_id)
                .ok_or_else(|| Error::OperationNotFound(op_id.clone()))?;
            op.entity_id = server_id.clone();
        }

        for (ref_kind, ref_id, field) in &self.entity_references {
            // The renamed entity may reference itself only if kinds match.
            let ref_id = if *ref_kind == kind && *ref_id == temp_id {
                &server_id
            } else {
                ref_id
            };
            let entity = snapshot
                .entities_mut(*ref_kind)
                .get_mut(ref_id)
                .ok_or_else(|| Error::EntityNotFound(ref_id.clone()))?;
            set_reference(&mut entity.payload, field, &server_id);
        }

        for (op_id, field) in &self.payload_references {
            let op = snapshot
                .queue
                .get_mut(op_id)
                .ok_or_else(|| Error::OperationNotFound(op_id.clone()))?;
            if let Some(payload) = op.payload.as_mut() {
                set_reference(payload, field, &server_id);
            }
        }

        for conflict_id in &self.conflicts {
            if let Some(conflict) = snapshot.conflicts.get_mut(conflict_id) {
                conflict.entity_id = server_id.clone();
            }
        }

        snapshot.resolved_ids.insert(temp_id, server_id);
        Ok(())
    }
}

fn set_reference(payload: &mut serde_json::Value, field: &str, id: &str) {
    if let Some(obj) = payload.as_object_mut() {
        obj.insert(field.to_string(), serde_json::Value::String(id.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CachedEntity, PendingOperation};
    use serde_json::json;

    fn snapshot_with_recipe_and_session() -> CacheSnapshot {
        let mut snapshot = CacheSnapshot::new("node-1");
        snapshot.insert(CachedEntity::new_local(
            "temp_r",
            EntityKind::Recipe,
            json!({"name": "Best Bitter"}),
            1000,
        ));
        snapshot.insert(CachedEntity::new_local(
            "temp_s",
            EntityKind::BrewSession,
            json!({"name": "Brew day", "recipe_id": "temp_r"}),
            1100,
        ));
        snapshot.queue.push(PendingOperation::create(
            "op-1",
            EntityKind::Recipe,
            "temp_r",
            json!({"name": "Best Bitter"}),
            1000,
        ));
        snapshot.queue.push(PendingOperation::create(
            "op-2",
            EntityKind::BrewSession,
            "temp_s",
            json!({"name": "Brew day", "recipe_id": "temp_r"}),
            1100,
        ));
        snapshot.queue.push(PendingOperation::update(
            "op-3",
            EntityKind::Recipe,
            "temp_r",
            json!({"name": "Best Bitter v2"}),
            None,
            1200,
        ));
        snapshot
    }

    fn rewrite() -> IdRewrite {
        IdRewrite {
            kind: EntityKind::Recipe,
            temp_id: "temp_r".into(),
            server_id: "rcp_100".into(),
        }
    }

    #[test]
    fn plan_collects_every_location() {
        let snapshot = snapshot_with_recipe_and_session();
        let plan = RewritePlan::plan(&snapshot, rewrite());

        // entity + 2 ops + session reference + session create payload
        assert_eq!(plan.len(), 5);
        assert_eq!(plan.rewrite().server_id, "rcp_100");
    }

    #[test]
    fn plan_does_not_modify() {
        let snapshot = snapshot_with_recipe_and_session();
        let before = snapshot.clone();
        let _ = RewritePlan::plan(&snapshot, rewrite());
        assert_eq!(snapshot, before);
    }

    #[test]
    fn apply_leaves_no_temporary_id_behind() {
        let mut snapshot = snapshot_with_recipe_and_session();
        let plan = RewritePlan::plan(&snapshot, rewrite());
        plan.apply(&mut snapshot).unwrap();

        let recipe = snapshot.recipes.get("rcp_100").unwrap();
        assert_eq!(recipe.temp_id.as_deref(), Some("temp_r"));
        assert!(!snapshot.recipes.contains_key("temp_r"));

        let session = snapshot.brew_sessions.get("temp_s").unwrap();
        assert_eq!(session.reference("recipe_id"), Some("rcp_100"));

        let json = snapshot.to_json().unwrap();
        let remaining = json.matches("\"temp_r\"").count();
        // Only the resolved_ids key and the entity's tempId remain.
        assert_eq!(remaining, 2);
        assert_eq!(snapshot.canonical_id("temp_r"), "rcp_100");
    }

    #[test]
    fn apply_rewrites_conflicts() {
        let mut snapshot = snapshot_with_recipe_and_session();
        snapshot.conflicts.insert(
            "c-1".into(),
            Conflict {
                id: "c-1".into(),
                entity_type: EntityKind::Recipe,
                entity_id: "temp_r".into(),
                operation_id: "op-3".into(),
                local_base_version: None,
                remote_version: Some(2),
                detected_at: 1300,
            },
        );

        RewritePlan::plan(&snapshot, rewrite())
            .apply(&mut snapshot)
            .unwrap();
        assert_eq!(snapshot.conflicts["c-1"].entity_id, "rcp_100");
    }

    #[test]
    fn empty_plan_for_unknown_id() {
        let snapshot = CacheSnapshot::new("node-1");
        let plan = RewritePlan::plan(&snapshot, rewrite());
        assert!(plan.is_empty());
    }

    #[test]
    fn conflict_resolution_wire_names() {
        assert_eq!(
            serde_json::to_string(&ConflictResolution::RemoteWins).unwrap(),
            "\"remoteWins\""
        );
    }
}
