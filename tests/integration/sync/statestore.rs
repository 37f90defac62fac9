//! State-store snapshots: initial write, delta write, unchanged detection.

use super::common::MemoryStateStore;
use gateway_config_controller::bundle::Bundle;
use gateway_config_controller::crd::StateStoreSpec;
use gateway_config_controller::statestore::{read_bundle, write_snapshot, SnapshotWrite};
use serde_json::json;

const LATEST: &str = "l7:prod:repository:policies-repository:latest";
const DELTA: &str = "l7:prod:repository:policies-repository:delta";

fn spec() -> StateStoreSpec {
    serde_json::from_value(json!({
        "redis": {"url": "redis://redis:6379"},
        "storeId": "prod"
    }))
    .unwrap()
}

fn bundle(document: serde_json::Value) -> Bundle {
    Bundle::from_json(&document).unwrap()
}

#[tokio::test]
async fn test_snapshot_lifecycle() {
    let store = MemoryStateStore::default();
    let first = bundle(json!({
        "clusterProperties": [{"name": "a", "value": "1"}, {"name": "b", "value": "2"}]
    }));

    let write = write_snapshot(&store, &spec(), "policies-repository", &first)
        .await
        .unwrap();
    assert_eq!(write, SnapshotWrite::Initial);
    assert_eq!(read_bundle(&store, LATEST).await.unwrap(), Some(first.clone()));
    assert_eq!(read_bundle(&store, DELTA).await.unwrap(), None);

    let second = bundle(json!({
        "clusterProperties": [{"name": "a", "value": "10"}, {"name": "c", "value": "3"}]
    }));
    let write = write_snapshot(&store, &spec(), "policies-repository", &second)
        .await
        .unwrap();
    assert_eq!(write, SnapshotWrite::Delta { changed: 2, removed: 1 });
    assert_eq!(read_bundle(&store, LATEST).await.unwrap(), Some(second.clone()));

    let delta = read_bundle(&store, DELTA).await.unwrap().unwrap();
    assert!(delta.get("clusterProperties", "c").is_some());
    assert!(delta.deletes()["clusterProperties"].contains("b"));

    let write = write_snapshot(&store, &spec(), "policies-repository", &second)
        .await
        .unwrap();
    assert_eq!(write, SnapshotWrite::Unchanged);
}

#[tokio::test]
async fn test_snapshot_ignores_deletes_of_current_bundle() {
    let store = MemoryStateStore::default();
    let mut current = bundle(json!({"services": [{"name": "echo"}]}));
    current.tombstone("services", "legacy");

    write_snapshot(&store, &spec(), "policies-repository", &current)
        .await
        .unwrap();

    let latest = read_bundle(&store, LATEST).await.unwrap().unwrap();
    assert!(!latest.has_deletes());
    assert_eq!(latest.entity_count(), 1);
}
