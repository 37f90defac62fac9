//! Domain jobs against the fake cluster: delivery, gating, tombstones, deregistration.

use super::common::{FakeCluster, Harness, GATEWAY, NAMESPACE};
use gateway_config_controller::cluster::SecretData;
use gateway_config_controller::constants::{MANAGEMENT_POD_LABEL, MANAGEMENT_POD_LABEL_VALUE};
use gateway_config_controller::crd::{ClusterProperty, EntityRef, ExternalReference};
use gateway_config_controller::scheduler::{Job, JobOutcome};
use gateway_config_controller::sync::{DomainJob, SyncDomain};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const PROPERTIES_MARKER: &str = "cluster-properties.gateway-config.io/ssg";

fn properties_cluster(pods: usize) -> FakeCluster {
    let cluster = FakeCluster::with_pods(pods);
    cluster.management_secret();
    cluster.add_gateway(json!({
        "replicas": pods,
        "management": {"secretName": "ssg-management"},
        "clusterProperties": {
            "enabled": true,
            "properties": [{"name": "env", "value": "prod"}]
        }
    }));
    cluster
}

fn job(harness: &Harness, domain: SyncDomain) -> DomainJob {
    DomainJob::new(
        Arc::clone(&harness.context),
        NAMESPACE.to_string(),
        GATEWAY.to_string(),
        domain,
    )
}

#[tokio::test]
async fn test_cluster_properties_reach_every_pod() {
    let harness = Harness::new(properties_cluster(3));
    let job = job(&harness, SyncDomain::ClusterProperties);

    assert_eq!(job.run().await.unwrap(), JobOutcome::Continue);

    let deliveries = harness.gateway.deliveries();
    assert_eq!(deliveries.len(), 3);
    assert!(deliveries[0].body.contains("\"env\""));
    let fingerprint = deliveries[0].fingerprint.clone();
    for pod in ["ssg-0", "ssg-1", "ssg-2"] {
        assert_eq!(
            harness.cluster.pod_label(pod, PROPERTIES_MARKER).as_deref(),
            Some(fingerprint.as_str())
        );
    }

    let status = harness.cluster.gateway().status.unwrap();
    let applied = &status.last_applied["cluster-properties"];
    assert_eq!(applied.fingerprint, fingerprint);
    assert_eq!(
        applied.entities,
        vec![EntityRef {
            kind: "clusterProperties".to_string(),
            name: "env".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_unchanged_properties_are_not_redelivered() {
    let harness = Harness::new(properties_cluster(3));
    let job = job(&harness, SyncDomain::ClusterProperties);

    job.run().await.unwrap();
    job.run().await.unwrap();

    assert_eq!(harness.gateway.deliveries().len(), 3);
}

#[tokio::test]
async fn test_markers_gate_delivery_without_cache() {
    let harness = Harness::with_cache_ttl(properties_cluster(3), Duration::ZERO);
    let job = job(&harness, SyncDomain::ClusterProperties);

    job.run().await.unwrap();
    job.run().await.unwrap();
    assert_eq!(harness.gateway.deliveries().len(), 3);

    harness.cluster.edit_gateway(|spec| {
        spec.cluster_properties.properties = vec![ClusterProperty {
            name: "env".to_string(),
            value: "dev".to_string(),
        }];
    });
    job.run().await.unwrap();

    let deliveries = harness.gateway.deliveries();
    assert_eq!(deliveries.len(), 6);
    assert_ne!(deliveries[0].fingerprint, deliveries[5].fingerprint);
    assert_eq!(
        harness.cluster.pod_label("ssg-1", PROPERTIES_MARKER),
        Some(deliveries[5].fingerprint.clone())
    );
}

#[tokio::test]
async fn test_new_pod_receives_current_bundle() {
    let harness = Harness::with_cache_ttl(properties_cluster(2), Duration::ZERO);
    let job = job(&harness, SyncDomain::ClusterProperties);
    job.run().await.unwrap();

    harness.cluster.add_pod("ssg-2", "10.0.0.2", true);
    job.run().await.unwrap();

    let deliveries = harness.gateway.deliveries();
    assert_eq!(deliveries.len(), 3);
    assert_eq!(deliveries[2].base_url, "https://10.0.0.2:9443");
}

#[tokio::test]
async fn test_suspended_gateway_is_skipped() {
    let harness = Harness::new(properties_cluster(1));
    harness.cluster.edit_gateway(|spec| spec.suspend = true);

    let outcome = job(&harness, SyncDomain::ClusterProperties).run().await.unwrap();

    assert_eq!(outcome, JobOutcome::Continue);
    assert!(harness.gateway.deliveries().is_empty());
}

#[tokio::test]
async fn test_deleted_gateway_deregisters() {
    let harness = Harness::new(properties_cluster(1));
    harness.cluster.remove_gateway();

    let outcome = job(&harness, SyncDomain::ClusterProperties).run().await.unwrap();
    assert_eq!(outcome, JobOutcome::Deregister);
}

#[tokio::test]
async fn test_disabled_domain_deregisters() {
    let harness = Harness::new(properties_cluster(1));
    harness
        .cluster
        .edit_gateway(|spec| spec.cluster_properties.enabled = false);

    let outcome = job(&harness, SyncDomain::ClusterProperties).run().await.unwrap();
    assert_eq!(outcome, JobOutcome::Deregister);
    assert!(harness.gateway.deliveries().is_empty());
}

#[tokio::test]
async fn test_missing_management_secret_is_configuration_error() {
    let cluster = FakeCluster::with_pods(1);
    cluster.add_gateway(json!({
        "management": {"secretName": "ssg-management"},
        "clusterProperties": {"enabled": true, "properties": [{"name": "env", "value": "prod"}]}
    }));
    let harness = Harness::new(cluster);

    let error = job(&harness, SyncDomain::ClusterProperties)
        .run()
        .await
        .unwrap_err();
    assert!(!error.is_transient());
}

fn external_cluster() -> FakeCluster {
    let cluster = FakeCluster::with_pods(1);
    cluster.management_secret();
    cluster.add_secret(
        "db-creds",
        SecretData::opaque(BTreeMap::from([("password".to_string(), b"s3cret".to_vec())])),
    );
    cluster.add_gateway(json!({
        "management": {"secretName": "ssg-management"},
        "externalSecrets": [{"name": "db-creds"}]
    }));
    cluster
}

#[tokio::test]
async fn test_removed_external_secret_is_deleted() {
    let harness = Harness::new(external_cluster());
    let job = job(&harness, SyncDomain::ExternalSecrets);

    job.run().await.unwrap();
    let first = harness.gateway.deliveries();
    assert_eq!(first.len(), 1);
    assert!(first[0].body.contains("db-creds-password"));

    harness.cluster.edit_gateway(|spec| spec.external_secrets.clear());
    assert_eq!(job.run().await.unwrap(), JobOutcome::Continue);

    let deliveries = harness.gateway.deliveries();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries[1].body.contains("DELETE"));
    assert!(deliveries[1].body.contains("db-creds-password"));
    let status = harness.cluster.gateway().status.unwrap();
    assert!(status.last_applied["external-secrets"].entities.is_empty());

    assert_eq!(job.run().await.unwrap(), JobOutcome::Deregister);
    assert_eq!(harness.gateway.deliveries().len(), 2);
}

#[tokio::test]
async fn test_disabled_external_secret_is_deleted() {
    let harness = Harness::new(external_cluster());
    let job = job(&harness, SyncDomain::ExternalSecrets);
    job.run().await.unwrap();

    harness.cluster.edit_gateway(|spec| {
        spec.external_secrets = vec![ExternalReference {
            enabled: false,
            ..spec.external_secrets[0].clone()
        }];
    });
    job.run().await.unwrap();

    let deliveries = harness.gateway.deliveries();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries[1].body.contains("DELETE"));
}

#[tokio::test]
async fn test_missing_external_secret_is_configuration_error() {
    let harness = Harness::new(external_cluster());
    harness.cluster.secrets.lock().unwrap().remove("db-creds");

    let error = job(&harness, SyncDomain::ExternalSecrets)
        .run()
        .await
        .unwrap_err();
    assert!(!error.is_transient());
    assert!(harness.gateway.deliveries().is_empty());
}

#[tokio::test]
async fn test_management_pod_is_elected_and_kept() {
    let harness = Harness::new(properties_cluster(3));
    let job = job(&harness, SyncDomain::ManagementPod);

    job.run().await.unwrap();
    assert_eq!(
        harness.cluster.pod_label("ssg-0", MANAGEMENT_POD_LABEL).as_deref(),
        Some(MANAGEMENT_POD_LABEL_VALUE)
    );
    let status = harness.cluster.gateway().status.unwrap();
    assert_eq!(status.management_pod.as_deref(), Some("ssg-0"));
    assert!(status.ready);
    assert_eq!(status.gateways.len(), 3);

    harness.cluster.add_pod("ssg-0", "10.0.0.0", false);
    job.run().await.unwrap();

    assert_eq!(harness.cluster.pod_label("ssg-0", MANAGEMENT_POD_LABEL), None);
    assert_eq!(
        harness.cluster.pod_label("ssg-1", MANAGEMENT_POD_LABEL).as_deref(),
        Some(MANAGEMENT_POD_LABEL_VALUE)
    );
    let status = harness.cluster.gateway().status.unwrap();
    assert_eq!(status.management_pod.as_deref(), Some("ssg-1"));
    assert!(!status.ready);
}

#[tokio::test]
async fn test_duplicate_management_labels_are_cleared() {
    let harness = Harness::new(properties_cluster(3));
    for pod in ["ssg-1", "ssg-2"] {
        harness
            .cluster
            .pods
            .lock()
            .unwrap()
            .get_mut(pod)
            .unwrap()
            .labels
            .insert(
                MANAGEMENT_POD_LABEL.to_string(),
                MANAGEMENT_POD_LABEL_VALUE.to_string(),
            );
    }

    job(&harness, SyncDomain::ManagementPod).run().await.unwrap();

    assert_eq!(harness.cluster.pod_label("ssg-0", MANAGEMENT_POD_LABEL), None);
    assert_eq!(
        harness.cluster.pod_label("ssg-1", MANAGEMENT_POD_LABEL).as_deref(),
        Some(MANAGEMENT_POD_LABEL_VALUE)
    );
    assert_eq!(harness.cluster.pod_label("ssg-2", MANAGEMENT_POD_LABEL), None);
    let status = harness.cluster.gateway().status.unwrap();
    assert_eq!(status.management_pod.as_deref(), Some("ssg-1"));
}

#[tokio::test]
async fn test_concurrent_attempt_backs_off_while_delivery_in_flight() {
    let harness = Harness::new(properties_cluster(1));
    let gate = harness.gateway.hold();
    let first = job(&harness, SyncDomain::ClusterProperties);
    let second = job(&harness, SyncDomain::ClusterProperties);

    let running = tokio::spawn(async move { first.run().await });
    gate.entered.notified().await;

    let outcome = tokio::time::timeout(Duration::from_secs(5), second.run())
        .await
        .expect("second attempt waited on the gateway")
        .unwrap();
    assert_eq!(outcome, JobOutcome::Continue);

    gate.release.notify_one();
    running.await.unwrap().unwrap();

    assert_eq!(harness.gateway.deliveries().len(), 1);
    assert!(harness
        .cluster
        .pod_label("ssg-0", PROPERTIES_MARKER)
        .is_some());
}
