//! UserCacheService - offline-first CRUD and the sync pass.
//!
//! Every mutation is applied to the local [`UserCache`] and persisted before
//! the call returns, so the UI never waits on the network. The sync pass
//! later replays the outbox against the [`RemoteApi`].
//!
//! The whole cache lives under one store key. Read-modify-writes are
//! serialized by an async mutex that is only held around storage calls;
//! remote calls happen with the mutex released, so local edits made while a
//! sync is in flight are never blocked and never lost.

use crate::api::{ApiError, ErrorClass, RemoteApi};
use crate::error::{ClientError, Result};
use crate::network::NetworkState;
use crate::storage::KeyValueStore;
use brewsync_engine::{
    CacheSnapshot, CachedEntity, Conflict, ConflictResolution, CreateOutcome, DeleteOutcome,
    EntityKind, MergeSummary, NodeId, OperationType, PendingOperation, RemoteEntity, UserCache,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Store key of the composite cache snapshot.
pub const USER_CACHE_KEY: &str = "brewsync:user_cache";

/// Failure category reported for a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncErrorKind {
    Network,
    Validation,
    Authorization,
    Storage,
    Internal,
}

impl From<ErrorClass> for SyncErrorKind {
    fn from(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Network => SyncErrorKind::Network,
            ErrorClass::Validation | ErrorClass::NotFound | ErrorClass::Conflict => {
                SyncErrorKind::Validation
            }
            ErrorClass::Authorization => SyncErrorKind::Authorization,
        }
    }
}

/// One failed operation in a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncError {
    pub operation_id: String,
    pub entity_id: String,
    pub kind: SyncErrorKind,
    pub message: String,
}

impl SyncError {
    fn new(op: &PendingOperation, kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation_id: op.id.clone(),
            entity_id: op.entity_id.clone(),
            kind,
            message: message.into(),
        }
    }

    fn from_client(op_id: &str, entity_id: &str, err: &ClientError) -> Self {
        let kind = match err {
            ClientError::Storage(_) | ClientError::Serialization(_) => SyncErrorKind::Storage,
            ClientError::Api(api) => api.class().into(),
            _ => SyncErrorKind::Internal,
        };
        Self {
            operation_id: op_id.to_string(),
            entity_id: entity_id.to_string(),
            kind,
            message: err.to_string(),
        }
    }
}

/// Outcome of a sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Operations the server accepted
    pub processed: usize,
    /// Operations dropped as permanently rejected
    pub failed: usize,
    /// Conflicts detected this pass
    pub conflicts: usize,
    pub errors: Vec<SyncError>,
}

impl SyncResult {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.conflicts == 0 && self.errors.is_empty()
    }
}

/// What the remote did with an operation.
enum Delivered {
    Created(RemoteEntity),
    Updated(RemoteEntity),
    Deleted,
}

enum Claim {
    Ready(PendingOperation),
    /// Not sendable this pass
    Skipped,
    /// Dropped because it references a temporary entity that is gone
    Dangling {
        target: String,
        dropped: Vec<PendingOperation>,
    },
}

enum Flow {
    Continue,
    Abort,
}

/// Clears the in-flight flag when the pass ends, however it ends.
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The user cache service.
pub struct UserCacheService {
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn RemoteApi>,
    network: watch::Receiver<NetworkState>,
    node_id: NodeId,
    lock: Mutex<()>,
    syncing: AtomicBool,
    pending_tx: watch::Sender<usize>,
}

impl UserCacheService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn RemoteApi>,
        network: watch::Receiver<NetworkState>,
        node_id: impl Into<NodeId>,
    ) -> Self {
        let (pending_tx, _rx) = watch::channel(0);
        Self {
            store,
            api,
            network,
            node_id: node_id.into(),
            lock: Mutex::new(()),
            syncing: AtomicBool::new(false),
            pending_tx,
        }
    }

    /// Create a service wrapped in Arc for sharing.
    pub fn new_shared(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn RemoteApi>,
        network: watch::Receiver<NetworkState>,
        node_id: impl Into<NodeId>,
    ) -> Arc<Self> {
        Arc::new(Self::new(store, api, network, node_id))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_online(&self) -> bool {
        self.network.borrow().is_connected
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Pending-operation count, published after every persisted change.
    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.pending_tx.subscribe()
    }

    // ------------------------------------------------------------------
    // Recipes
    // ------------------------------------------------------------------

    pub async fn create_recipe(&self, payload: serde_json::Value) -> Result<CachedEntity> {
        self.create(EntityKind::Recipe, payload).await
    }

    pub async fn update_recipe(
        &self,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<CachedEntity> {
        self.update(EntityKind::Recipe, id, payload).await
    }

    pub async fn delete_recipe(&self, id: &str) -> Result<DeleteOutcome> {
        self.delete(EntityKind::Recipe, id).await
    }

    pub async fn get_recipes(&self) -> Result<Vec<CachedEntity>> {
        self.list(EntityKind::Recipe).await
    }

    pub async fn get_recipe(&self, id: &str) -> Result<Option<CachedEntity>> {
        self.get(EntityKind::Recipe, id).await
    }

    // ------------------------------------------------------------------
    // Brew sessions
    // ------------------------------------------------------------------

    pub async fn create_brew_session(&self, payload: serde_json::Value) -> Result<CachedEntity> {
        self.create(EntityKind::BrewSession, payload).await
    }

    pub async fn update_brew_session(
        &self,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<CachedEntity> {
        self.update(EntityKind::BrewSession, id, payload).await
    }

    pub async fn delete_brew_session(&self, id: &str) -> Result<DeleteOutcome> {
        self.delete(EntityKind::BrewSession, id).await
    }

    pub async fn get_brew_sessions(&self) -> Result<Vec<CachedEntity>> {
        self.list(EntityKind::BrewSession).await
    }

    pub async fn get_brew_session(&self, id: &str) -> Result<Option<CachedEntity>> {
        self.get(EntityKind::BrewSession, id).await
    }

    // ------------------------------------------------------------------
    // Generic entity access
    // ------------------------------------------------------------------

    /// Create an entity locally under a temporary ID.
    pub async fn create(&self, kind: EntityKind, payload: serde_json::Value) -> Result<CachedEntity> {
        let now = crate::now_ms();
        let entity = self.mutate(|cache| cache.create(kind, payload, now)).await?;
        tracing::debug!(kind = %kind, id = %entity.id, "Created locally");
        Ok(entity)
    }

    pub async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<CachedEntity> {
        let now = crate::now_ms();
        let entity = self
            .mutate(|cache| cache.update(kind, id, payload, now))
            .await?;
        tracing::debug!(kind = %kind, id = %entity.id, "Updated locally");
        Ok(entity)
    }

    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<DeleteOutcome> {
        let now = crate::now_ms();
        let outcome = self.mutate(|cache| cache.delete(kind, id, now)).await?;
        tracing::debug!(kind = %kind, id = %id, outcome = ?outcome, "Deleted locally");
        Ok(outcome)
    }

    pub async fn list(&self, kind: EntityKind) -> Result<Vec<CachedEntity>> {
        let cache = self.load().await?;
        Ok(cache.list(kind).into_iter().cloned().collect())
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<CachedEntity>> {
        let cache = self.load().await?;
        Ok(cache.get(kind, id).cloned())
    }

    /// Merge the server's listing of `kind` into the cache.
    pub async fn refresh_from_server(&self, kind: EntityKind) -> Result<MergeSummary> {
        if !self.is_online() {
            return Err(ClientError::Offline);
        }
        let remote = self.api.list_entities(kind).await?;
        let now = crate::now_ms();
        let summary = self
            .mutate(|cache| Ok(cache.merge_remote(kind, remote, now)))
            .await?;
        tracing::info!(
            kind = %kind,
            updated = summary.updated,
            removed = summary.removed,
            kept_local = summary.kept_local,
            "Refreshed from server"
        );
        Ok(summary)
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Number of queued operations. Never fails: an unreadable or corrupted
    /// cache counts as empty.
    pub async fn get_pending_operations_count(&self) -> usize {
        match self.load().await {
            Ok(cache) => {
                let count = cache.pending_count();
                self.publish_pending(count);
                count
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read pending operations");
                0
            }
        }
    }

    /// Queued operations in replay order.
    pub async fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
        let cache = self.load().await?;
        Ok(cache.pending_ops().cloned().collect())
    }

    /// Discard every queued operation and recorded conflict.
    pub async fn clear_sync_queue(&self) -> Result<usize> {
        let cleared = self.mutate(|cache| Ok(cache.clear_queue())).await?;
        tracing::info!(cleared, "Cleared sync queue");
        Ok(cleared)
    }

    pub async fn conflicts(&self) -> Result<Vec<Conflict>> {
        let cache = self.load().await?;
        Ok(cache.conflicts().cloned().collect())
    }

    /// Number of unresolved conflicts; 0 when the cache cannot be read.
    pub async fn conflict_count(&self) -> usize {
        match self.load().await {
            Ok(cache) => cache.conflict_count(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read conflicts");
                0
            }
        }
    }

    /// Conflict resolution is not supported yet; always fails.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<()> {
        tracing::warn!(
            conflict_id,
            resolution = ?resolution,
            "Conflict resolution requested but not implemented"
        );
        Err(ClientError::NotImplemented)
    }

    // ------------------------------------------------------------------
    // Sync pass
    // ------------------------------------------------------------------

    /// Replay the outbox against the server.
    ///
    /// Fails fast with [`ClientError::Offline`] or
    /// [`ClientError::SyncInProgress`]; per-operation failures are reported
    /// in the returned [`SyncResult`].
    pub async fn sync_pending_operations(&self) -> Result<SyncResult> {
        if !self.is_online() {
            return Err(ClientError::Offline);
        }
        let _guard = self.begin_sync().ok_or(ClientError::SyncInProgress)?;

        let order = {
            let _lock = self.lock.lock().await;
            self.load().await?.drain_order()
        };
        tracing::info!(operations = order.len(), "Starting sync pass");

        let mut result = SyncResult::default();
        for op_id in order {
            let op = match self.claim(&op_id).await {
                Ok(Claim::Ready(op)) => op,
                Ok(Claim::Skipped) => continue,
                Ok(Claim::Dangling { target, dropped }) => {
                    for rejected in &dropped {
                        result.errors.push(SyncError::new(
                            rejected,
                            SyncErrorKind::Validation,
                            format!("dropped: references {target}, which will never be created"),
                        ));
                    }
                    result.failed += dropped.len();
                    continue;
                }
                Err(e) => {
                    tracing::warn!(op_id = %op_id, error = %e, "Failed to claim operation");
                    result.errors.push(SyncError::from_client(&op_id, "", &e));
                    continue;
                }
            };

            let delivered = self.send(&op).await;

            match self.settle(&op, delivered, &mut result).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Abort) => break,
                Err(e) => {
                    tracing::warn!(op_id = %op.id, error = %e, "Failed to record sync outcome");
                    result
                        .errors
                        .push(SyncError::from_client(&op.id, &op.entity_id, &e));
                }
            }
        }

        tracing::info!(
            processed = result.processed,
            failed = result.failed,
            conflicts = result.conflicts,
            errors = result.errors.len(),
            "Sync pass finished"
        );
        Ok(result)
    }

    fn begin_sync(&self) -> Option<SyncGuard<'_>> {
        self.syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(&self.syncing))
    }

    /// Take the operation for sending if it is still ready.
    ///
    /// An operation stuck behind a reference that can never resolve is
    /// rejected here instead of waiting forever.
    async fn claim(&self, op_id: &str) -> Result<Claim> {
        let _lock = self.lock.lock().await;
        let mut cache = self.load().await?;
        if let Some(op) = cache.ready_operation(op_id).cloned() {
            cache.mark_syncing(op_id)?;
            self.save(&cache).await?;
            return Ok(Claim::Ready(op));
        }

        let Some((target, dropped)) = cache.reject_dangling(op_id)? else {
            tracing::trace!(op_id, "Operation not ready, skipping");
            return Ok(Claim::Skipped);
        };
        tracing::warn!(
            op_id,
            target = %target,
            dropped = dropped.len(),
            "Operation references an entity that will never be created"
        );
        self.save(&cache).await?;
        Ok(Claim::Dangling { target, dropped })
    }

    async fn send(&self, op: &PendingOperation) -> std::result::Result<Delivered, ApiError> {
        let kind = op.entity_type;
        tracing::debug!(
            op_id = %op.id,
            kind = %kind,
            entity_id = %op.entity_id,
            operation = %op.operation_type,
            attempts = op.attempts,
            "Sending operation"
        );
        match op.operation_type {
            OperationType::Create => self
                .api
                .create_entity(kind, &op.payload_or_null())
                .await
                .map(Delivered::Created),
            OperationType::Update => self
                .api
                .update_entity(kind, &op.entity_id, &op.payload_or_null(), op.base_version)
                .await
                .map(Delivered::Updated),
            OperationType::Delete => self
                .api
                .delete_entity(kind, &op.entity_id, op.base_version)
                .await
                .map(|()| Delivered::Deleted),
        }
    }

    /// Fold the remote outcome back into the cache.
    async fn settle(
        &self,
        op: &PendingOperation,
        delivered: std::result::Result<Delivered, ApiError>,
        result: &mut SyncResult,
    ) -> Result<Flow> {
        let _lock = self.lock.lock().await;
        let mut cache = self.load().await?;
        let now = crate::now_ms();

        let flow = match delivered {
            Ok(Delivered::Created(remote)) => {
                match cache.complete_create(op, remote.id, remote.version, now)? {
                    CreateOutcome::Resolved(rewrite) => tracing::info!(
                        kind = %rewrite.kind,
                        temp_id = %rewrite.temp_id,
                        server_id = %rewrite.server_id,
                        "Resolved temporary ID"
                    ),
                    CreateOutcome::Orphaned {
                        server_id,
                        delete_op,
                    } => tracing::info!(
                        server_id = %server_id,
                        delete_op = %delete_op,
                        "Created entity was deleted locally; queued remote delete"
                    ),
                }
                result.processed += 1;
                Flow::Continue
            }
            Ok(Delivered::Updated(remote)) => {
                cache.complete_update(op, remote.version);
                result.processed += 1;
                Flow::Continue
            }
            Ok(Delivered::Deleted) => {
                cache.complete_delete(op);
                result.processed += 1;
                Flow::Continue
            }
            Err(err) => self.record_failure(&mut cache, op, err, result, now)?,
        };

        self.save(&cache).await?;
        Ok(flow)
    }

    fn record_failure(
        &self,
        cache: &mut UserCache,
        op: &PendingOperation,
        err: ApiError,
        result: &mut SyncResult,
        now: u64,
    ) -> Result<Flow> {
        // No base version to conflict with: the server refused the payload.
        let class = match err.class() {
            ErrorClass::Conflict if op.operation_type == OperationType::Create => {
                ErrorClass::Validation
            }
            class => class,
        };
        match class {
            ErrorClass::NotFound if op.operation_type == OperationType::Delete => {
                tracing::debug!(op_id = %op.id, "Entity already gone remotely");
                cache.complete_delete(op);
                result.processed += 1;
            }
            ErrorClass::Network => {
                let attempts = tolerate_missing(cache.record_retry(&op.id))?;
                tracing::warn!(op_id = %op.id, attempts = ?attempts, error = %err, "Operation will be retried");
                result
                    .errors
                    .push(SyncError::new(op, SyncErrorKind::Network, err.to_string()));
            }
            ErrorClass::Validation | ErrorClass::NotFound => {
                let dropped = tolerate_missing(cache.record_rejection(&op.id))?.unwrap_or_default();
                tracing::warn!(
                    op_id = %op.id,
                    dropped = dropped.len(),
                    error = %err,
                    "Operation rejected"
                );
                for (i, rejected) in dropped.iter().enumerate() {
                    let message = if i == 0 {
                        err.to_string()
                    } else {
                        format!("dropped: {} was never created remotely", rejected.entity_id)
                    };
                    result
                        .errors
                        .push(SyncError::new(rejected, SyncErrorKind::Validation, message));
                }
                result.failed += dropped.len();
            }
            ErrorClass::Conflict => {
                let remote_version = match &err {
                    ApiError::Conflict { remote_version, .. } => *remote_version,
                    _ => None,
                };
                if let Some(conflict) =
                    tolerate_missing(cache.record_conflict(&op.id, remote_version, now))?
                {
                    tracing::warn!(
                        conflict_id = %conflict.id,
                        entity_id = %conflict.entity_id,
                        local_base_version = ?conflict.local_base_version,
                        remote_version = ?conflict.remote_version,
                        "Conflict detected"
                    );
                    result.conflicts += 1;
                }
            }
            ErrorClass::Authorization => {
                tolerate_missing(cache.release(&op.id))?;
                tracing::error!(op_id = %op.id, error = %err, "Not authorized; aborting sync pass");
                result.errors.push(SyncError::new(
                    op,
                    SyncErrorKind::Authorization,
                    err.to_string(),
                ));
                return Ok(Flow::Abort);
            }
        }
        Ok(Flow::Continue)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    async fn load(&self) -> Result<UserCache> {
        match self.store.get(USER_CACHE_KEY).await? {
            Some(json) => Ok(UserCache::from_snapshot(CacheSnapshot::from_json(&json)?)),
            None => Ok(UserCache::new(self.node_id.clone())),
        }
    }

    async fn save(&self, cache: &UserCache) -> Result<()> {
        let json = cache.snapshot().to_json()?;
        self.store.set(USER_CACHE_KEY, json).await?;
        self.publish_pending(cache.pending_count());
        Ok(())
    }

    fn publish_pending(&self, count: usize) {
        self.pending_tx.send_if_modified(|current| {
            let changed = *current != count;
            *current = count;
            changed
        });
    }

    /// Load, apply `f`, persist, all under the cache lock.
    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut UserCache) -> brewsync_engine::error::Result<T>,
    {
        let _lock = self.lock.lock().await;
        let mut cache = self.load().await?;
        let out = f(&mut cache)?;
        self.save(&cache).await?;
        Ok(out)
    }
}

/// The operation may have left the queue while its request was in flight
/// (local delete, cleared queue). That is not a failure of the pass.
fn tolerate_missing<T>(res: brewsync_engine::error::Result<T>) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(brewsync_engine::Error::OperationNotFound(op_id)) => {
            tracing::debug!(op_id = %op_id, "Operation left the queue during sync");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
