//! Sync orchestration for the UI.
//!
//! [`OfflineSync`] runs a full sync (outbox first, then reference data) and
//! publishes `{pendingOperations, isSyncing, conflicts, lastSync}` through a
//! watch channel. [`SyncStatusMonitor`] turns connectivity and queue depth
//! into the status banner.

use crate::error::{ClientError, Result};
use crate::network::NetworkState;
use crate::static_data::StaticDataService;
use crate::user_cache::{SyncResult, UserCacheService};
use brewsync_engine::{ConflictResolution, StatusView, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Observable sync state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineSyncState {
    pub pending_operations: usize,
    pub is_syncing: bool,
    pub conflicts: usize,
    pub last_sync: Option<Timestamp>,
}

pub struct OfflineSync {
    user_cache: Arc<UserCacheService>,
    static_data: Arc<StaticDataService>,
    network: watch::Receiver<NetworkState>,
    state: watch::Sender<OfflineSyncState>,
}

impl OfflineSync {
    pub fn new(
        user_cache: Arc<UserCacheService>,
        static_data: Arc<StaticDataService>,
        network: watch::Receiver<NetworkState>,
    ) -> Self {
        let (state, _rx) = watch::channel(OfflineSyncState::default());
        Self {
            user_cache,
            static_data,
            network,
            state,
        }
    }

    /// Create an orchestrator wrapped in Arc for sharing.
    pub fn new_shared(
        user_cache: Arc<UserCacheService>,
        static_data: Arc<StaticDataService>,
        network: watch::Receiver<NetworkState>,
    ) -> Arc<Self> {
        Arc::new(Self::new(user_cache, static_data, network))
    }

    pub fn subscribe(&self) -> watch::Receiver<OfflineSyncState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> OfflineSyncState {
        self.state.borrow().clone()
    }

    /// Reload counts from the cache.
    pub async fn refresh(&self) -> OfflineSyncState {
        let pending_operations = self.user_cache.get_pending_operations_count().await;
        let conflicts = self.user_cache.conflict_count().await;
        let is_syncing = self.user_cache.is_syncing();
        self.state.send_modify(|state| {
            state.pending_operations = pending_operations;
            state.conflicts = conflicts;
            state.is_syncing = is_syncing;
        });
        self.state()
    }

    /// Sync the outbox, then refresh any stale reference data.
    ///
    /// Offline and in-progress errors propagate. Reference-data failures are
    /// logged and left for the next sync.
    pub async fn sync(&self) -> Result<SyncResult> {
        if !self.user_cache.is_online() {
            return Err(ClientError::Offline);
        }
        if self.user_cache.is_syncing() {
            return Err(ClientError::SyncInProgress);
        }
        self.state.send_modify(|state| state.is_syncing = true);

        let outcome = self.user_cache.sync_pending_operations().await;
        if outcome.is_ok() {
            self.refresh_static_data().await;
            let now = crate::now_ms();
            self.state.send_modify(|state| state.last_sync = Some(now));
        }

        self.refresh().await;
        outcome
    }

    pub async fn clear_pending(&self) -> Result<usize> {
        let cleared = self.user_cache.clear_sync_queue().await;
        self.refresh().await;
        cleared
    }

    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<()> {
        self.user_cache
            .resolve_conflict(conflict_id, resolution)
            .await
    }

    /// Sync whenever connectivity comes back with work queued.
    ///
    /// The task ends when the connectivity sender is dropped.
    pub fn spawn_auto_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut network = self.network.clone();
        let mut was_connected = network.borrow_and_update().is_connected;
        tokio::spawn(async move {
            while network.changed().await.is_ok() {
                let connected = network.borrow_and_update().is_connected;
                let reconnected = connected && !was_connected;
                was_connected = connected;
                if !reconnected {
                    continue;
                }

                let pending = this.user_cache.get_pending_operations_count().await;
                if pending == 0 {
                    continue;
                }
                tracing::info!(pending, "Connectivity restored, syncing");
                match this.sync().await {
                    Ok(result) => tracing::info!(
                        processed = result.processed,
                        failed = result.failed,
                        conflicts = result.conflicts,
                        "Auto sync finished"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Auto sync failed"),
                }
            }
            tracing::debug!("Connectivity channel closed, auto sync stopped");
        })
    }

    async fn refresh_static_data(&self) {
        let check = match self.static_data.check_for_updates().await {
            Ok(check) => check,
            Err(e) => {
                tracing::warn!(error = %e, "Static data version check failed");
                return;
            }
        };
        let updates = check.stale_datasets().into_iter().map(|dataset| async move {
            (dataset, self.static_data.update_cache(dataset).await)
        });
        for (dataset, outcome) in futures::future::join_all(updates).await {
            if let Err(e) = outcome {
                tracing::warn!(dataset = %dataset, error = %e, "Static data refresh failed");
            }
        }
    }
}

/// Derives the status banner from connectivity and queue depth.
pub struct SyncStatusMonitor {
    network: watch::Receiver<NetworkState>,
    pending: watch::Receiver<usize>,
}

impl SyncStatusMonitor {
    pub fn new(network: watch::Receiver<NetworkState>, pending: watch::Receiver<usize>) -> Self {
        Self { network, pending }
    }

    pub fn for_service(
        user_cache: &UserCacheService,
        network: watch::Receiver<NetworkState>,
    ) -> Self {
        Self::new(network, user_cache.subscribe_pending())
    }

    pub fn current(&self) -> StatusView {
        StatusView::derive(self.network.borrow().is_connected, *self.pending.borrow())
    }

    /// Wait for either input to change and return the new status.
    /// `None` once both inputs are closed.
    pub async fn changed(&mut self) -> Option<StatusView> {
        let mut network_open = true;
        let mut pending_open = true;
        while network_open || pending_open {
            tokio::select! {
                res = self.network.changed(), if network_open => match res {
                    Ok(()) => break,
                    Err(_) => network_open = false,
                },
                res = self.pending.changed(), if pending_open => match res {
                    Ok(()) => break,
                    Err(_) => pending_open = false,
                },
            }
        }
        if !network_open && !pending_open {
            return None;
        }
        let _ = self.network.borrow_and_update();
        let _ = self.pending.borrow_and_update();
        Some(self.current())
    }
}
