//! # brewsync client
//!
//! Async services over [`brewsync_engine`]: the user cache with its outbox
//! replay, the static reference-data cache, and the sync orchestration the
//! app's screens observe.
//!
//! Collaborators are injected as trait objects:
//!
//! - [`KeyValueStore`] for persistence ([`MemoryStore`], [`FileStore`])
//! - [`RemoteApi`] for the backend ([`HttpApi`])
//! - a [`NetworkMonitor`] watch channel for connectivity
//!
//! ```no_run
//! use brewsync_client::{
//!     HttpApi, MemoryStore, NetworkMonitor, NetworkState, UserCacheService,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let network = NetworkMonitor::new(NetworkState::offline());
//! let api = HttpApi::new("https://api.example.com", None, Duration::from_secs(30))?;
//! let cache = UserCacheService::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(api),
//!     network.subscribe(),
//!     "device_1",
//! );
//!
//! cache.create_recipe(json!({"name": "Citra Pale Ale"})).await?;
//! assert_eq!(cache.get_pending_operations_count().await, 1);
//!
//! network.set_connected(true);
//! let result = cache.sync_pending_operations().await?;
//! println!("synced {} operations", result.processed);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod static_data;
pub mod storage;
pub mod sync;
pub mod user_cache;

pub use api::{ApiError, ErrorClass, HttpApi, RemoteApi, StaticDataPayload};
pub use config::{Config, ConfigError};
pub use error::{ClientError, Result};
pub use network::{ConnectionType, NetworkMonitor, NetworkState};
pub use static_data::{CacheStats, StaticDataService};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use sync::{OfflineSync, OfflineSyncState, SyncStatusMonitor};
pub use user_cache::{SyncError, SyncErrorKind, SyncResult, UserCacheService, USER_CACHE_KEY};

use brewsync_engine::Timestamp;

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
