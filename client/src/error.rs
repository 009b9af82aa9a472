//! Error types for the client services.

use crate::api::ApiError;
use crate::storage::StorageError;

/// Errors surfaced by the cache and sync services.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot sync while offline")]
    Offline,

    #[error("sync already in progress")]
    SyncInProgress,

    #[error("conflict resolution not implemented")]
    NotImplemented,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("api error: {0}")]
    Api(#[from] ApiError),

    #[error("engine error: {0}")]
    Engine(#[from] brewsync_engine::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
