//! Orchestration, reference data and the status banner.

mod common;

use brewsync_client::{ApiError, ClientError, KeyValueStore, OfflineSync, SyncStatusMonitor};
use brewsync_engine::{
    BeerStyleFilter, ConflictResolution, IngredientFilter, StaticDataset, SyncState,
};
use common::Harness;
use serde_json::json;
use std::time::Duration;

fn seed_static(h: &Harness, version: &str) {
    h.api.set_static(
        StaticDataset::Ingredients,
        version,
        vec![
            json!({"name": "Maris Otter", "type": "grain"}),
            json!({"name": "Citra", "type": "hop"}),
            json!({"name": "Mosaic", "type": "hop"}),
        ],
    );
    h.api.set_static(
        StaticDataset::BeerStyles,
        version,
        vec![
            json!({"name": "American IPA", "category": "IPA"}),
            json!({"name": "Dry Stout", "category": "Stout"}),
        ],
    );
}

#[tokio::test]
async fn sync_refreshes_outbox_then_reference_data() {
    let h = Harness::new(true);
    seed_static(&h, "v1");
    let orchestrator = OfflineSync::new(
        h.user_cache.clone(),
        h.static_data.clone(),
        h.network.subscribe(),
    );
    h.user_cache
        .create_recipe(json!({"name": "Saison"}))
        .await
        .unwrap();

    let state = orchestrator.refresh().await;
    assert_eq!(state.pending_operations, 1);
    assert!(state.last_sync.is_none());

    let result = orchestrator.sync().await.unwrap();
    assert_eq!(result.processed, 1);

    let state = orchestrator.state();
    assert_eq!(state.pending_operations, 0);
    assert!(!state.is_syncing);
    assert!(state.last_sync.is_some());

    let stats = h.static_data.cache_stats().await.unwrap();
    assert!(stats.iter().all(|s| s.version.as_deref() == Some("v1")));
    assert_eq!(stats[0].items, 3);
}

#[tokio::test]
async fn sync_errors_propagate_and_reset_state() {
    let h = Harness::new(false);
    let orchestrator = OfflineSync::new(
        h.user_cache.clone(),
        h.static_data.clone(),
        h.network.subscribe(),
    );

    let mut state_rx = orchestrator.subscribe();
    state_rx.borrow_and_update();

    let err = orchestrator.sync().await.unwrap_err();
    assert!(matches!(err, ClientError::Offline));
    // rejected before any state was published
    assert!(!state_rx.has_changed().unwrap());
    let state = orchestrator.state();
    assert!(!state.is_syncing);
    assert!(state.last_sync.is_none());
}

#[tokio::test]
async fn static_failures_do_not_fail_sync() {
    let h = Harness::new(true);
    let orchestrator = OfflineSync::new(
        h.user_cache.clone(),
        h.static_data.clone(),
        h.network.subscribe(),
    );
    // No versions published: the version check fails.
    let result = orchestrator.sync().await.unwrap();
    assert_eq!(result, Default::default());
    assert!(orchestrator.state().last_sync.is_some());
}

#[tokio::test]
async fn clear_pending_and_resolve_conflict() {
    let h = Harness::new(false);
    let orchestrator = OfflineSync::new(
        h.user_cache.clone(),
        h.static_data.clone(),
        h.network.subscribe(),
    );
    h.user_cache
        .create_recipe(json!({"name": "Mild"}))
        .await
        .unwrap();

    assert_eq!(orchestrator.clear_pending().await.unwrap(), 1);
    assert_eq!(orchestrator.state().pending_operations, 0);

    let err = orchestrator
        .resolve_conflict("conflict_1", ConflictResolution::RemoteWins)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not implemented"));
}

#[tokio::test]
async fn auto_sync_runs_on_reconnect() {
    let h = Harness::new(false);
    seed_static(&h, "v1");
    let orchestrator = OfflineSync::new_shared(
        h.user_cache.clone(),
        h.static_data.clone(),
        h.network.subscribe(),
    );
    let task = orchestrator.spawn_auto_sync();

    h.user_cache
        .create_recipe(json!({"name": "Kolsch"}))
        .await
        .unwrap();
    let mut pending = h.user_cache.subscribe_pending();
    assert_eq!(*pending.borrow_and_update(), 1);

    h.network.set_connected(true);
    tokio::time::timeout(Duration::from_secs(5), pending.wait_for(|n| *n == 0))
        .await
        .expect("auto sync did not drain the queue")
        .unwrap();

    task.abort();
}

#[tokio::test]
async fn status_banner_follows_connectivity_and_queue() {
    let h = Harness::new(false);
    let mut monitor = SyncStatusMonitor::for_service(&h.user_cache, h.network.subscribe());

    let view = monitor.current();
    assert_eq!(view.status, SyncState::Offline);
    assert_eq!(view.message, "Offline");
    assert!(!view.has_issues);

    h.user_cache
        .create_recipe(json!({"name": "Lager"}))
        .await
        .unwrap();
    let view = monitor.changed().await.unwrap();
    assert_eq!(view.message, "1 change pending (offline)");
    assert_eq!(view.color.hex(), "#f44336");
    assert!(view.has_issues);

    h.network.set_connected(true);
    let view = monitor.changed().await.unwrap();
    assert_eq!(view.status, SyncState::Pending);
    assert_eq!(view.message, "1 change pending");
    assert!(!view.has_issues);

    h.user_cache.sync_pending_operations().await.unwrap();
    let view = monitor.changed().await.unwrap();
    assert_eq!(view.status, SyncState::Synced);
    assert_eq!(view.message, "No changes to sync");
    assert_eq!(view.color.hex(), "#4caf50");
}

#[tokio::test]
async fn check_for_updates_flags_missing_and_changed_datasets() {
    let h = Harness::new(true);
    seed_static(&h, "v1");

    let check = h.static_data.check_for_updates().await.unwrap();
    assert!(check.ingredients && check.beer_styles);

    h.static_data.update_ingredients_cache().await.unwrap();
    h.static_data.update_beer_styles_cache().await.unwrap();
    let check = h.static_data.check_for_updates().await.unwrap();
    assert!(!check.any());

    h.api.set_static(StaticDataset::BeerStyles, "v2", vec![]);
    let check = h.static_data.check_for_updates().await.unwrap();
    assert!(!check.ingredients);
    assert!(check.beer_styles);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_snapshot() {
    let h = Harness::new(true);
    seed_static(&h, "v1");
    h.static_data.update_ingredients_cache().await.unwrap();

    h.api.fail_next(ApiError::Network("reset".to_string()));
    assert!(h.static_data.update_ingredients_cache().await.is_err());

    let all = h
        .static_data
        .get_ingredients(&IngredientFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn reference_data_is_fetched_on_first_use_and_filtered() {
    let h = Harness::new(true);
    seed_static(&h, "v1");

    let hops = h
        .static_data
        .get_ingredients(&IngredientFilter {
            ingredient_type: Some("hop".to_string()),
            search: Some("cit".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(hops, vec![json!({"name": "Citra", "type": "hop"})]);

    let stouts = h
        .static_data
        .get_beer_styles(&BeerStyleFilter {
            search: Some("stout".to_string()),
            category: None,
        })
        .await
        .unwrap();
    assert_eq!(stouts.len(), 1);

    // Served from cache afterwards.
    let fetches = h
        .api
        .calls()
        .iter()
        .filter(|c| c.starts_with("static"))
        .count();
    h.static_data
        .get_ingredients(&IngredientFilter::default())
        .await
        .unwrap();
    let after = h
        .api
        .calls()
        .iter()
        .filter(|c| c.starts_with("static"))
        .count();
    assert_eq!(fetches, after);
}

#[tokio::test]
async fn check_due_and_clear_cache() {
    let h = Harness::new(true);
    seed_static(&h, "v1");
    assert!(h.static_data.is_check_due(brewsync_client::now_ms()).await);

    h.static_data.update_ingredients_cache().await.unwrap();
    h.static_data.update_beer_styles_cache().await.unwrap();
    let now = brewsync_client::now_ms();
    assert!(!h.static_data.is_check_due(now).await);
    assert!(h.static_data.is_check_due(now + 3_600_000).await);

    h.static_data.clear_cache().await.unwrap();
    let stats = h.static_data.cache_stats().await.unwrap();
    assert!(stats.iter().all(|s| s.version.is_none() && s.items == 0));
}

#[tokio::test]
async fn corrupted_static_snapshot_reads_as_missing() {
    let h = Harness::new(true);
    seed_static(&h, "v1");
    h.store
        .set("brewsync:static:ingredients", "garbage".to_string())
        .await
        .unwrap();

    let check = h.static_data.check_for_updates().await.unwrap();
    assert!(check.ingredients);
}
