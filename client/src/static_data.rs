//! StaticDataService - cached reference data.
//!
//! Ingredients and beer styles are downloaded whole and stored as one
//! snapshot per dataset. A single version query decides which datasets are
//! stale; a failed refresh leaves the previous snapshot in place.

use crate::api::RemoteApi;
use crate::error::Result;
use crate::storage::KeyValueStore;
use brewsync_engine::{
    BeerStyleFilter, IngredientFilter, StaticDataSnapshot, StaticDataset, Timestamp, UpdateCheck,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Store key of a dataset snapshot.
pub fn storage_key(dataset: StaticDataset) -> &'static str {
    match dataset {
        StaticDataset::Ingredients => "brewsync:static:ingredients",
        StaticDataset::BeerStyles => "brewsync:static:beer_styles",
    }
}

/// Summary of one cached dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub dataset: StaticDataset,
    pub version: Option<String>,
    pub items: usize,
    pub cached_at: Option<Timestamp>,
}

/// The static data service.
pub struct StaticDataService {
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn RemoteApi>,
    check_interval: Duration,
}

impl StaticDataService {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn RemoteApi>,
        check_interval: Duration,
    ) -> Self {
        Self {
            store,
            api,
            check_interval,
        }
    }

    /// Ask the server which datasets changed.
    ///
    /// Datasets with no snapshot always need a refresh. Cached snapshots get
    /// their `last_checked` bumped.
    pub async fn check_for_updates(&self) -> Result<UpdateCheck> {
        let versions = self.api.fetch_static_versions().await?;
        let now = crate::now_ms();
        let mut check = UpdateCheck::default();

        for dataset in StaticDataset::ALL {
            let server_version = versions.version_for(dataset);
            let cached = self.load(dataset).await?;
            let stale = UpdateCheck::needs_refresh(cached.as_ref(), server_version);
            check.set(dataset, stale);

            if let Some(mut snapshot) = cached {
                snapshot.last_checked = now;
                self.save(&snapshot).await?;
            }
            tracing::debug!(
                dataset = %dataset,
                server_version,
                stale,
                "Checked static data version"
            );
        }

        Ok(check)
    }

    pub async fn update_ingredients_cache(&self) -> Result<StaticDataSnapshot> {
        self.update_cache(StaticDataset::Ingredients).await
    }

    pub async fn update_beer_styles_cache(&self) -> Result<StaticDataSnapshot> {
        self.update_cache(StaticDataset::BeerStyles).await
    }

    /// Download a dataset and replace its snapshot with one write.
    pub async fn update_cache(&self, dataset: StaticDataset) -> Result<StaticDataSnapshot> {
        let payload = self.api.fetch_static_data(dataset).await?;
        let snapshot =
            StaticDataSnapshot::new(dataset, payload.version, payload.data, crate::now_ms());
        self.save(&snapshot).await?;
        tracing::info!(
            dataset = %dataset,
            version = %snapshot.version,
            items = snapshot.len(),
            "Static data cache updated"
        );
        Ok(snapshot)
    }

    /// Cached ingredients, downloading them on first use.
    pub async fn get_ingredients(&self, filter: &IngredientFilter) -> Result<Vec<serde_json::Value>> {
        let snapshot = self.load_or_fetch(StaticDataset::Ingredients).await?;
        Ok(filter.apply(&snapshot.data))
    }

    /// Cached beer styles, downloading them on first use.
    pub async fn get_beer_styles(&self, filter: &BeerStyleFilter) -> Result<Vec<serde_json::Value>> {
        let snapshot = self.load_or_fetch(StaticDataset::BeerStyles).await?;
        Ok(filter.apply(&snapshot.data))
    }

    /// Whether any dataset is missing or was last checked longer ago than
    /// the configured interval.
    pub async fn is_check_due(&self, now: Timestamp) -> bool {
        let interval_ms = u64::try_from(self.check_interval.as_millis()).unwrap_or(u64::MAX);
        for dataset in StaticDataset::ALL {
            match self.load(dataset).await {
                Ok(Some(snapshot)) if !snapshot.is_check_due(now, interval_ms) => {}
                Ok(_) => return true,
                Err(e) => {
                    tracing::warn!(dataset = %dataset, error = %e, "Failed to read static data");
                    return true;
                }
            }
        }
        false
    }

    pub async fn clear_cache(&self) -> Result<()> {
        for dataset in StaticDataset::ALL {
            self.store.delete(storage_key(dataset)).await?;
        }
        tracing::info!("Static data cache cleared");
        Ok(())
    }

    pub async fn cache_stats(&self) -> Result<Vec<CacheStats>> {
        let mut stats = Vec::with_capacity(StaticDataset::ALL.len());
        for dataset in StaticDataset::ALL {
            let snapshot = self.load(dataset).await?;
            stats.push(CacheStats {
                dataset,
                version: snapshot.as_ref().map(|s| s.version.clone()),
                items: snapshot.as_ref().map_or(0, StaticDataSnapshot::len),
                cached_at: snapshot.as_ref().map(|s| s.cached_at),
            });
        }
        Ok(stats)
    }

    async fn load_or_fetch(&self, dataset: StaticDataset) -> Result<StaticDataSnapshot> {
        match self.load(dataset).await? {
            Some(snapshot) => Ok(snapshot),
            None => self.update_cache(dataset).await,
        }
    }

    /// Read a snapshot. A corrupted record reads as missing so the next
    /// refresh replaces it.
    async fn load(&self, dataset: StaticDataset) -> Result<Option<StaticDataSnapshot>> {
        let Some(json) = self.store.get(storage_key(dataset)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!(dataset = %dataset, error = %e, "Discarding corrupted static data");
                Ok(None)
            }
        }
    }

    async fn save(&self, snapshot: &StaticDataSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.store.set(storage_key(snapshot.dataset), json).await?;
        Ok(())
    }
}
