//! Shared fixtures for the client integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use brewsync_client::{
    api::ApiResult, ApiError, KeyValueStore, MemoryStore, NetworkMonitor, NetworkState,
    RemoteApi, StaticDataPayload, StaticDataService, StorageError, UserCacheService,
};
use brewsync_engine::{EntityKind, RemoteEntity, StaticDataset, StaticVersions, Version};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// In-memory backend with scripted failures.
#[derive(Default)]
pub struct MockApi {
    next_id: AtomicU64,
    entities: Mutex<HashMap<(EntityKind, String), RemoteEntity>>,
    failures: Mutex<VecDeque<ApiError>>,
    calls: Mutex<Vec<String>>,
    versions: Mutex<Option<StaticVersions>>,
    datasets: Mutex<HashMap<StaticDataset, StaticDataPayload>>,
    gate: Mutex<Option<Gate>>,
}

/// Blocks remote mutations until released.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next remote call fails with `err`.
    pub fn fail_next(&self, err: ApiError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn install_gate(&self) -> Gate {
        let gate = Gate::default();
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remote(&self, kind: EntityKind, id: &str) -> Option<RemoteEntity> {
        self.entities
            .lock()
            .unwrap()
            .get(&(kind, id.to_string()))
            .cloned()
    }

    pub fn remote_count(&self, kind: EntityKind) -> usize {
        self.entities
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Put an entity on the server directly.
    pub fn seed(&self, kind: EntityKind, id: &str, version: Version, data: serde_json::Value) {
        self.entities.lock().unwrap().insert(
            (kind, id.to_string()),
            RemoteEntity {
                id: id.to_string(),
                version,
                data,
            },
        );
    }

    pub fn set_static(&self, dataset: StaticDataset, version: &str, data: Vec<serde_json::Value>) {
        self.datasets.lock().unwrap().insert(
            dataset,
            StaticDataPayload {
                version: version.to_string(),
                data,
            },
        );
        let mut versions = self.versions.lock().unwrap();
        let current = versions.get_or_insert_with(|| StaticVersions {
            ingredients: String::new(),
            beer_styles: String::new(),
        });
        match dataset {
            StaticDataset::Ingredients => current.ingredients = version.to_string(),
            StaticDataset::BeerStyles => current.beer_styles = version.to_string(),
        }
    }

    fn record(&self, call: String) -> ApiResult<()> {
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }

    fn prefix(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Recipe => "rcp",
            EntityKind::BrewSession => "bs",
        }
    }
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn create_entity(
        &self,
        kind: EntityKind,
        payload: &serde_json::Value,
    ) -> ApiResult<RemoteEntity> {
        self.pass_gate().await;
        self.record(format!("create {kind}"))?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entity = RemoteEntity {
            id: format!("{}_{n}", Self::prefix(kind)),
            version: 1,
            data: payload.clone(),
        };
        self.entities
            .lock()
            .unwrap()
            .insert((kind, entity.id.clone()), entity.clone());
        Ok(entity)
    }

    async fn update_entity(
        &self,
        kind: EntityKind,
        id: &str,
        payload: &serde_json::Value,
        _base_version: Option<Version>,
    ) -> ApiResult<RemoteEntity> {
        self.pass_gate().await;
        self.record(format!("update {kind} {id}"))?;
        let mut entities = self.entities.lock().unwrap();
        let entity = entities
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        entity.version += 1;
        entity.data = payload.clone();
        Ok(entity.clone())
    }

    async fn delete_entity(
        &self,
        kind: EntityKind,
        id: &str,
        _base_version: Option<Version>,
    ) -> ApiResult<()> {
        self.pass_gate().await;
        self.record(format!("delete {kind} {id}"))?;
        self.entities
            .lock()
            .unwrap()
            .remove(&(kind, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn list_entities(&self, kind: EntityKind) -> ApiResult<Vec<RemoteEntity>> {
        self.record(format!("list {kind}"))?;
        let mut listed: Vec<_> = self
            .entities
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, e)| e.clone())
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }

    async fn fetch_static_versions(&self) -> ApiResult<StaticVersions> {
        self.record("versions".to_string())?;
        self.versions
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApiError::Network("no versions".to_string()))
    }

    async fn fetch_static_data(&self, dataset: StaticDataset) -> ApiResult<StaticDataPayload> {
        self.record(format!("static {dataset}"))?;
        self.datasets
            .lock()
            .unwrap()
            .get(&dataset)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(dataset.to_string()))
    }
}

/// A store whose every call fails.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("disk on fire".to_string()))
    }

    async fn set(&self, _key: &str, _value: String) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disk on fire".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disk on fire".to_string()))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disk on fire".to_string()))
    }
}

/// A memory store that fails one chosen `set` call.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    sets_until_failure: Mutex<Option<usize>>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Let `n` more writes through, then fail the next one.
    pub fn fail_set_after(&self, n: usize) {
        *self.sets_until_failure.lock().unwrap() = Some(n);
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        {
            let mut remaining = self.sets_until_failure.lock().unwrap();
            match *remaining {
                Some(0) => {
                    *remaining = None;
                    return Err(StorageError::Unavailable("quota exceeded".to_string()));
                }
                Some(n) => *remaining = Some(n - 1),
                None => {}
            }
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.inner.clear().await
    }
}

/// Service wiring over a memory store and the mock backend.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub api: Arc<MockApi>,
    pub network: NetworkMonitor,
    pub user_cache: Arc<UserCacheService>,
    pub static_data: Arc<StaticDataService>,
}

impl Harness {
    pub fn new(online: bool) -> Self {
        let store = MemoryStore::new_shared();
        let api = MockApi::new();
        let network = NetworkMonitor::new(NetworkState::default());
        network.set_connected(online);
        let user_cache = UserCacheService::new_shared(
            store.clone(),
            api.clone(),
            network.subscribe(),
            "test-device",
        );
        let static_data = Arc::new(StaticDataService::new(
            store.clone(),
            api.clone(),
            Duration::from_secs(3600),
        ));
        Self {
            store,
            api,
            network,
            user_cache,
            static_data,
        }
    }
}
