//! Repository references: resolve, publish, deliver, remove.

use super::common::{FakeCluster, Harness, GATEWAY, NAMESPACE};
use gateway_config_controller::bundle::BundleKind;
use gateway_config_controller::repository::snapshot::gunzip;
use gateway_config_controller::scheduler::{Job, JobOutcome};
use gateway_config_controller::sync::{DomainJob, SyncDomain};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const MARKER: &str = "repository.gateway-config.io/policies";

fn repository_harness(pods: usize) -> Harness {
    let cluster = FakeCluster::with_pods(pods);
    cluster.management_secret();
    cluster.add_repository(
        "policies",
        json!({"type": "local", "localReference": {"secretName": "policies-files"}}),
    );
    cluster.add_gateway(json!({
        "management": {"secretName": "ssg-management"},
        "repositoryReferences": [{
            "name": "policies",
            "notification": {"enabled": true, "url": "https://hooks.example.com/deploy"}
        }]
    }));
    let harness = Harness::new(cluster);
    harness.resolver.set(
        "services.json",
        json!({"services": [{"name": "echo", "resolutionPath": "/echo"}]}),
    );
    harness
}

fn job(harness: &Harness) -> DomainJob {
    DomainJob::new(
        Arc::clone(&harness.context),
        NAMESPACE.to_string(),
        GATEWAY.to_string(),
        SyncDomain::Repositories,
    )
}

#[tokio::test]
async fn test_repository_bundle_is_delivered_and_published() {
    let harness = repository_harness(2);

    assert_eq!(job(&harness).run().await.unwrap(), JobOutcome::Continue);

    let deliveries = harness.gateway.deliveries();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries.iter().all(|d| d.kind == BundleKind::Repository && !d.delete));
    assert!(deliveries[0].body.contains("/echo"));
    for pod in ["ssg-0", "ssg-1"] {
        assert_eq!(
            harness.cluster.pod_label(pod, MARKER),
            Some(deliveries[0].fingerprint.clone())
        );
    }

    let sent = harness.notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].repository, "policies");
    assert_eq!(sent[0].pods.len(), 2);

    assert!(harness
        .cluster
        .applied_secrets
        .lock()
        .unwrap()
        .contains(&"policies-repository".to_string()));
    let repository_status = harness.cluster.repository_status.lock().unwrap()["policies"].clone();
    assert_eq!(repository_status["ready"], true);
    assert_eq!(repository_status["commit"], json!(sent[0].commit));
    assert_eq!(repository_status["storageSecretName"], "policies-repository");

    let status = harness.cluster.gateway().status.unwrap();
    assert_eq!(status.repository_status.len(), 1);
    assert_eq!(status.repository_status[0].commit.as_deref(), Some(sent[0].commit.as_str()));
    assert!(status.last_applied.contains_key("repository-policies"));
}

#[tokio::test]
async fn test_repository_change_is_redelivered() {
    let harness = repository_harness(1);
    let job = job(&harness);
    job.run().await.unwrap();
    job.run().await.unwrap();
    assert_eq!(harness.gateway.deliveries().len(), 1);

    harness.resolver.set(
        "services.json",
        json!({"services": [{"name": "echo", "resolutionPath": "/echo/v2"}]}),
    );
    job.run().await.unwrap();

    let deliveries = harness.gateway.deliveries();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries[1].body.contains("/echo/v2"));
    assert_eq!(harness.notifier.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_removed_reference_is_deleted_then_deregistered() {
    let harness = repository_harness(2);
    let job = job(&harness);
    job.run().await.unwrap();

    harness
        .cluster
        .edit_gateway(|spec| spec.repository_references.clear());
    assert_eq!(job.run().await.unwrap(), JobOutcome::Continue);

    let deliveries = harness.gateway.deliveries();
    assert_eq!(deliveries.len(), 4);
    assert!(deliveries[2..].iter().all(|d| d.delete));
    assert!(deliveries[2].body.contains("DELETE"));
    assert!(deliveries[2].body.contains("echo"));
    assert_eq!(harness.cluster.pod_label("ssg-0", MARKER), None);
    assert_eq!(harness.cluster.pod_label("ssg-1", MARKER), None);

    let status = harness.cluster.gateway().status.unwrap();
    assert!(!status.last_applied.contains_key("repository-policies"));
    assert!(status.repository_status.is_empty());

    assert_eq!(job.run().await.unwrap(), JobOutcome::Deregister);
    assert_eq!(harness.gateway.deliveries().len(), 4);
}

#[tokio::test]
async fn test_disabled_repository_is_deleted() {
    let harness = repository_harness(1);
    let job = job(&harness);
    job.run().await.unwrap();

    harness
        .cluster
        .add_repository("policies", json!({"type": "local", "enabled": false}));
    job.run().await.unwrap();

    let deliveries = harness.gateway.deliveries();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries[1].delete);
    let status = harness.cluster.gateway().status.unwrap();
    assert!(!status.repository_status[0].enabled);
}

#[tokio::test]
async fn test_missing_repository_is_configuration_error() {
    let harness = repository_harness(1);
    harness.cluster.repositories.lock().unwrap().clear();

    let error = job(&harness).run().await.unwrap_err();

    assert!(!error.is_transient());
    assert!(harness.gateway.deliveries().is_empty());
}

#[tokio::test]
async fn test_state_store_failure_does_not_block_delivery() {
    let harness = repository_harness(1);
    harness.cluster.add_repository(
        "policies",
        json!({"type": "local", "stateStoreReference": "redis"}),
    );

    job(&harness).run().await.unwrap();

    assert_eq!(harness.gateway.deliveries().len(), 1);
    let repository_status = harness.cluster.repository_status.lock().unwrap()["policies"].clone();
    assert_eq!(repository_status["stateStoreSynced"], false);
    assert!(repository_status["message"]
        .as_str()
        .unwrap()
        .contains("state store not synced"));
}

/// Checkout with one service per top-level directory
fn write_tree(root: &Path) {
    for (directory, service) in [("a", "alpha"), ("b", "beta")] {
        std::fs::create_dir_all(root.join(directory)).unwrap();
        std::fs::write(
            root.join(directory).join("services.json"),
            json!({"services": [{"name": service, "resolutionPath": format!("/{service}")}]})
                .to_string(),
        )
        .unwrap();
    }
}

#[tokio::test]
async fn test_reference_directories_narrow_delivery_not_snapshot() {
    let harness = repository_harness(1);
    let checkout = tempfile::tempdir().unwrap();
    write_tree(checkout.path());
    harness.resolver.use_directory(checkout.path());
    harness.cluster.edit_gateway(|spec| {
        spec.repository_references[0].directories = vec!["a".to_string()];
    });

    job(&harness).run().await.unwrap();

    let deliveries = harness.gateway.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].body.contains("alpha"));
    assert!(!deliveries[0].body.contains("beta"));

    let secret = harness.cluster.secrets.lock().unwrap()["policies-repository"].clone();
    let snapshot =
        String::from_utf8(gunzip(&secret.data["policies.gz"]).unwrap()).unwrap();
    assert!(snapshot.contains("alpha"));
    assert!(snapshot.contains("beta"));
}

#[tokio::test]
async fn test_missing_reference_directory_is_configuration_error() {
    let harness = repository_harness(1);
    let checkout = tempfile::tempdir().unwrap();
    write_tree(checkout.path());
    harness.resolver.use_directory(checkout.path());
    harness.cluster.edit_gateway(|spec| {
        spec.repository_references[0].directories = vec!["missing".to_string()];
    });

    let error = job(&harness).run().await.unwrap_err();

    assert!(!error.is_transient());
    assert!(harness.gateway.deliveries().is_empty());
}

#[tokio::test]
async fn test_shared_checkout_is_resolved_one_job_at_a_time() {
    let harness = repository_harness(1);
    *harness.resolver.latency.lock().unwrap() = Duration::from_millis(50);
    let first = job(&harness);
    let second = job(&harness);

    let (first, second) = tokio::join!(first.run(), second.run());
    first.unwrap();
    second.unwrap();

    assert_eq!(harness.resolver.max_in_flight.load(Ordering::SeqCst), 1);
}
