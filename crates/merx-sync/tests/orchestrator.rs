//! Orchestrator integration tests against scripted connectors and the
//! in-memory store.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use common::{inventory_record, ScriptedConnector};
use merx_connector::ExternalRecord;
use merx_core::{EntityKind, MemoryStore, StoreWriter, StoredRecord};
use merx_sync::{
    MappingStore, MemoryMappingStore, ProductMapping, SyncConfig, SyncJob, SyncOrchestrator,
    SyncStatus,
};

struct Fixture {
    connector: Arc<ScriptedConnector>,
    store: Arc<MemoryStore>,
    mappings: Arc<MemoryMappingStore>,
    orchestrator: SyncOrchestrator,
    org: Uuid,
}

fn fixture(connector: ScriptedConnector, auto_map: bool) -> Fixture {
    let connector = Arc::new(connector);
    let store = Arc::new(MemoryStore::new());
    let mappings = Arc::new(MemoryMappingStore::new());
    let orchestrator = SyncOrchestrator::new(
        connector.clone(),
        store.clone(),
        mappings.clone(),
    )
    .with_config(SyncConfig {
        auto_map,
        ..SyncConfig::default()
    });
    Fixture {
        connector,
        store,
        mappings,
        orchestrator,
        org: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn two_pages_all_mappable_no_conflicts() {
    let page1: Vec<ExternalRecord> = (0..100)
        .map(|i| inventory_record(&format!("ext-{i}"), &format!("SKU-{i:03}"), i))
        .collect();
    let page2: Vec<ExternalRecord> = (100..150)
        .map(|i| inventory_record(&format!("ext-{i}"), &format!("SKU-{i:03}"), i))
        .collect();

    let f = fixture(ScriptedConnector::new("shopline", vec![page1, page2]), true);
    let mut job = SyncJob::pull(f.org, EntityKind::Inventory, "shopline");

    let mut progress = Vec::new();
    let outcome = f
        .orchestrator
        .sync(&mut job, |p| progress.push(p))
        .await
        .unwrap();

    assert!(outcome.success());
    assert_eq!(outcome.records_processed, 150);
    assert_eq!(outcome.records_failed, 0);
    assert_eq!(outcome.records_updated, 150);
    assert_eq!(outcome.conflicts_detected, 0);
    // The connector's fetch was invoked exactly twice.
    assert_eq!(f.connector.fetches(), 2);
    assert_eq!(job.status, SyncStatus::Completed);

    // Progress was reported after every page and finished at 100.
    assert_eq!(progress.len(), 2);
    assert!(progress[0] < 100.0);
    assert!((progress[1] - 100.0).abs() < f64::EPSILON);

    assert_eq!(f.store.count(f.org, EntityKind::Inventory).await, 150);
    assert_eq!(f.mappings.len().await, 150);
}

#[tokio::test]
async fn progress_uses_connector_estimate() {
    let page1: Vec<ExternalRecord> = (0..50)
        .map(|i| inventory_record(&format!("ext-{i}"), &format!("SKU-{i:03}"), i))
        .collect();
    let page2: Vec<ExternalRecord> = (50..100)
        .map(|i| inventory_record(&format!("ext-{i}"), &format!("SKU-{i:03}"), i))
        .collect();

    let connector =
        ScriptedConnector::new("shopline", vec![page1, page2]).with_estimated_total(100);
    let f = fixture(connector, true);
    let mut job = SyncJob::pull(f.org, EntityKind::Inventory, "shopline");

    let mut progress = Vec::new();
    f.orchestrator
        .sync(&mut job, |p| progress.push(p))
        .await
        .unwrap();

    assert!((progress[0] - 50.0).abs() < f64::EPSILON);
    assert!((progress[1] - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn applying_the_same_record_twice_is_idempotent() {
    let record = inventory_record("ext-1", "SKU-001", 5);
    let f = fixture(
        ScriptedConnector::new("shopline", vec![vec![record.clone()]]),
        true,
    );

    let mut job = SyncJob::pull(f.org, EntityKind::Inventory, "shopline");
    let first = f.orchestrator.sync(&mut job, |_| {}).await.unwrap();
    assert_eq!(first.records_updated, 1);

    let stored_after_first = f
        .store
        .get(f.org, EntityKind::Inventory, "SKU-001")
        .await
        .unwrap()
        .unwrap();

    // Second run sees the identical record again.
    let mut job = SyncJob::pull(f.org, EntityKind::Inventory, "shopline");
    let second = f.orchestrator.sync(&mut job, |_| {}).await.unwrap();

    assert_eq!(second.records_processed, 1);
    assert_eq!(second.records_updated, 0);
    assert_eq!(second.records_skipped, 1);
    assert_eq!(second.conflicts_detected, 0);

    let stored_after_second = f
        .store
        .get(f.org, EntityKind::Inventory, "SKU-001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored_after_first.attributes, stored_after_second.attributes);
    assert_eq!(stored_after_first.updated_at, stored_after_second.updated_at);
}

#[tokio::test]
async fn independent_local_edit_conflicts_and_newest_write_wins() {
    let incoming = inventory_record("ext-1", "SKU-001", 9)
        .with_updated_at(Utc::now());
    let f = fixture(ScriptedConnector::new("shopline", vec![vec![incoming]]), false);

    // Local edit from an hour ago; not derived from shopline.
    let mut local = StoredRecord::new("SKU-001", serde_json::json!({"sku": "SKU-001", "quantity": 5}));
    local.updated_at = Utc::now() - Duration::hours(1);
    f.store
        .upsert(f.org, EntityKind::Inventory, &local)
        .await
        .unwrap();
    f.mappings
        .create(&ProductMapping::new(
            f.org,
            EntityKind::Inventory,
            "SKU-001",
            "shopline",
            "ext-1",
        ))
        .await
        .unwrap();

    let mut job = SyncJob::pull(f.org, EntityKind::Inventory, "shopline");
    let outcome = f.orchestrator.sync(&mut job, |_| {}).await.unwrap();

    assert_eq!(outcome.conflicts_detected, 1);
    assert_eq!(outcome.records_updated, 1);
    let stored = f
        .store
        .get(f.org, EntityKind::Inventory, "SKU-001")
        .await
        .unwrap()
        .unwrap();
    // The newer shopline value won.
    assert_eq!(stored.attributes["quantity"], 9);
    assert_eq!(stored.last_source.as_deref(), Some("shopline"));
}

#[tokio::test]
async fn stale_external_write_loses_and_internal_value_is_retained() {
    let incoming = inventory_record("ext-1", "SKU-001", 9)
        .with_updated_at(Utc::now() - Duration::hours(2));
    let f = fixture(ScriptedConnector::new("shopline", vec![vec![incoming]]), false);

    let local = StoredRecord::new("SKU-001", serde_json::json!({"sku": "SKU-001", "quantity": 5}));
    f.store
        .upsert(f.org, EntityKind::Inventory, &local)
        .await
        .unwrap();
    f.mappings
        .create(&ProductMapping::new(
            f.org,
            EntityKind::Inventory,
            "SKU-001",
            "shopline",
            "ext-1",
        ))
        .await
        .unwrap();

    let mut job = SyncJob::pull(f.org, EntityKind::Inventory, "shopline");
    let outcome = f.orchestrator.sync(&mut job, |_| {}).await.unwrap();

    assert_eq!(outcome.conflicts_detected, 1);
    assert_eq!(outcome.records_skipped, 1);
    assert_eq!(outcome.records_updated, 0);
    let stored = f
        .store
        .get(f.org, EntityKind::Inventory, "SKU-001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.attributes["quantity"], 5);
}

#[tokio::test]
async fn unmapped_record_fails_without_aborting_the_page() {
    let mapped = inventory_record("ext-1", "SKU-001", 5);
    let unmapped = inventory_record("ext-2", "SKU-002", 7);
    let f = fixture(
        ScriptedConnector::new("shopline", vec![vec![mapped, unmapped]]),
        false,
    );
    f.mappings
        .create(&ProductMapping::new(
            f.org,
            EntityKind::Inventory,
            "SKU-001",
            "shopline",
            "ext-1",
        ))
        .await
        .unwrap();

    let mut job = SyncJob::pull(f.org, EntityKind::Inventory, "shopline");
    let outcome = f.orchestrator.sync(&mut job, |_| {}).await.unwrap();

    assert!(!outcome.success());
    assert_eq!(outcome.records_processed, 2);
    assert_eq!(outcome.records_updated, 1);
    assert_eq!(outcome.records_failed, 1);
    assert_eq!(outcome.errors.len(), 1);
    // The failed record is identified by its natural key.
    assert_eq!(outcome.errors[0].key, "SKU-002");
    assert!(outcome.errors[0].message.contains("auto-mapping is disabled"));
    assert_eq!(job.status, SyncStatus::CompletedWithErrors);
}

#[tokio::test]
async fn invalid_quantity_fails_per_record() {
    let good = inventory_record("ext-1", "SKU-001", 5);
    let bad = inventory_record("ext-2", "SKU-002", -4);
    let f = fixture(ScriptedConnector::new("shopline", vec![vec![good, bad]]), true);

    let mut job = SyncJob::pull(f.org, EntityKind::Inventory, "shopline");
    let outcome = f.orchestrator.sync(&mut job, |_| {}).await.unwrap();

    assert_eq!(outcome.records_updated, 1);
    assert_eq!(outcome.records_failed, 1);
    assert!(outcome.errors[0].message.contains("negative"));
}

#[tokio::test]
async fn authentication_failure_aborts_the_job() {
    let f = fixture(ScriptedConnector::new("shopline", vec![vec![]]), true);
    f.connector.break_auth();

    let mut job = SyncJob::pull(f.org, EntityKind::Inventory, "shopline");
    let err = f.orchestrator.sync(&mut job, |_| {}).await.unwrap_err();

    assert!(err.to_string().contains("authentication"));
    assert_eq!(job.status, SyncStatus::Failed);
}

#[tokio::test]
async fn push_sends_internal_records_and_records_new_mappings() {
    let f = fixture(ScriptedConnector::new("shopline", vec![]), false);

    for i in 0..3 {
        let record = StoredRecord::new(
            format!("SKU-{i:03}"),
            serde_json::json!({"sku": format!("SKU-{i:03}"), "quantity": i}),
        );
        f.store
            .upsert(f.org, EntityKind::Inventory, &record)
            .await
            .unwrap();
    }
    // One record is already mapped; the other two get mappings from
    // the connector's returned external ids.
    f.mappings
        .create(&ProductMapping::new(
            f.org,
            EntityKind::Inventory,
            "SKU-000",
            "shopline",
            "ext-0",
        ))
        .await
        .unwrap();

    let mut job = SyncJob::push(f.org, EntityKind::Inventory, "shopline");
    let outcome = f.orchestrator.sync(&mut job, |_| {}).await.unwrap();

    assert!(outcome.success());
    assert_eq!(outcome.records_processed, 3);
    assert_eq!(outcome.records_updated, 3);
    assert_eq!(f.connector.pushed.lock().await.len(), 3);
    assert_eq!(f.mappings.len().await, 3);
    assert_eq!(job.status, SyncStatus::Completed);

    let mapped = f
        .mappings
        .find_by_internal(f.org, EntityKind::Inventory, "shopline", "SKU-001")
        .await
        .unwrap();
    assert!(mapped.is_some());
}

#[tokio::test]
async fn push_respects_product_id_filter() {
    let f = fixture(ScriptedConnector::new("shopline", vec![]), false);
    for i in 0..4 {
        let record = StoredRecord::new(
            format!("SKU-{i:03}"),
            serde_json::json!({"sku": format!("SKU-{i:03}")}),
        );
        f.store
            .upsert(f.org, EntityKind::Product, &record)
            .await
            .unwrap();
    }

    let mut job = SyncJob::push(f.org, EntityKind::Product, "shopline");
    job.filters.product_ids = Some(vec!["SKU-001".to_string(), "SKU-003".to_string()]);
    let outcome = f.orchestrator.sync(&mut job, |_| {}).await.unwrap();

    assert_eq!(outcome.records_processed, 2);
    assert_eq!(f.connector.pushed.lock().await.len(), 2);
}
