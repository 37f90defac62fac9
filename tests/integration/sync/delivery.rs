//! Fleet delivery: checksum gate, partial failures, notifications, DB-backed deferral.

use super::common::{FakeCluster, Harness, GATEWAY, LABEL_KEY, NAMESPACE};
use gateway_config_controller::bundle::DesiredState;
use gateway_config_controller::cluster::DeploymentInfo;
use gateway_config_controller::crd::{ClusterProperty, NotificationConfig};
use gateway_config_controller::delivery::gate::marker_key;
use gateway_config_controller::delivery::{
    DeliveryState, FleetTarget, GatewayUpdateRequest, ManagementCredentials, NotificationTarget,
    Strategy,
};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

fn target(strategy: Strategy) -> FleetTarget {
    FleetTarget {
        namespace: NAMESPACE.to_string(),
        gateway: GATEWAY.to_string(),
        selector: format!("{LABEL_KEY}={GATEWAY}"),
        service: GATEWAY.to_string(),
        port: 9443,
        strategy,
    }
}

fn request(value: &str) -> GatewayUpdateRequest {
    let built = DesiredState::ClusterProperties(vec![ClusterProperty {
        name: "env".to_string(),
        value: value.to_string(),
    }])
    .build(&[])
    .unwrap();
    GatewayUpdateRequest::new(
        built,
        marker_key("cluster-properties", GATEWAY),
        ManagementCredentials {
            username: "admin".to_string(),
            password: Zeroizing::new("7layer".to_string()),
        },
    )
}

fn notification() -> NotificationTarget {
    NotificationTarget {
        config: NotificationConfig {
            enabled: true,
            url: "https://hooks.example.com/deploy".to_string(),
            headers: BTreeMap::new(),
        },
        repository: "policies".to_string(),
        commit: "abc123".to_string(),
    }
}

#[tokio::test]
async fn test_unchanged_fingerprint_is_delivered_once() {
    let harness = Harness::new(FakeCluster::with_pods(1));
    let delivery = harness.delivery();
    let request = request("prod");

    let first = delivery.deliver(&target(Strategy::Ephemeral), &request).await.unwrap();
    let second = delivery.deliver(&target(Strategy::Ephemeral), &request).await.unwrap();

    assert_eq!(harness.gateway.deliveries().len(), 1);
    assert_eq!(first.succeeded(), vec!["ssg-0".to_string()]);
    assert_eq!(second.attempted(), 0);
    assert_eq!(second.skipped, vec!["ssg-0".to_string()]);
    assert!(second.fleet_complete());
}

#[tokio::test]
async fn test_partial_failure_marks_only_successful_pods() {
    let harness = Harness::new(FakeCluster::with_pods(4));
    harness.gateway.fail("https://10.0.0.2:9443");
    let request = request("prod").with_notification(Some(notification()));
    let key = request.marker_key.clone();

    let report = harness
        .delivery()
        .deliver(&target(Strategy::Ephemeral), &request)
        .await
        .unwrap();

    assert_eq!(report.succeeded().len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.states["ssg-2"], DeliveryState::Pending);
    assert!(!report.fleet_complete());

    for pod in ["ssg-0", "ssg-1", "ssg-3"] {
        assert_eq!(
            harness.cluster.pod_label(pod, &key).as_deref(),
            Some(request.fingerprint.as_str())
        );
    }
    assert_eq!(harness.cluster.pod_label("ssg-2", &key), None);

    let sent = harness.notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let pods: Vec<&str> = sent[0].pods.keys().map(String::as_str).collect();
    assert_eq!(pods, vec!["ssg-0", "ssg-1", "ssg-3"]);
    assert_eq!(sent[0].commit, "abc123");
    assert_eq!(sent[0].deployment, GATEWAY);
}

#[tokio::test]
async fn test_failed_pod_is_retried_on_next_cycle() {
    let harness = Harness::new(FakeCluster::with_pods(2));
    harness.gateway.fail("https://10.0.0.1:9443");
    let request = request("prod");
    let delivery = harness.delivery();

    delivery.deliver(&target(Strategy::Ephemeral), &request).await.unwrap();
    harness.gateway.failing.lock().unwrap().clear();
    let retry = delivery.deliver(&target(Strategy::Ephemeral), &request).await.unwrap();

    assert_eq!(retry.succeeded(), vec!["ssg-1".to_string()]);
    assert_eq!(retry.skipped, vec!["ssg-0".to_string()]);
    assert!(retry.fleet_complete());
    assert_eq!(harness.gateway.deliveries().len(), 2);
}

#[tokio::test]
async fn test_notification_requires_enabled_flag() {
    let harness = Harness::new(FakeCluster::with_pods(1));
    let mut disabled = notification();
    disabled.config.enabled = false;
    let request = request("prod").with_notification(Some(disabled));

    harness
        .delivery()
        .deliver(&target(Strategy::Ephemeral), &request)
        .await
        .unwrap();

    assert_eq!(harness.gateway.deliveries().len(), 1);
    assert!(harness.notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unready_pods_are_not_targeted() {
    let cluster = FakeCluster::with_pods(2);
    cluster.add_pod("ssg-9", "10.0.0.9", false);
    let harness = Harness::new(cluster);

    let report = harness
        .delivery()
        .deliver(&target(Strategy::Ephemeral), &request("prod"))
        .await
        .unwrap();

    assert_eq!(report.ready_targets, 2);
    assert!(report.fleet_complete());
    assert!(harness
        .gateway
        .deliveries()
        .iter()
        .all(|delivered| delivered.base_url != "https://10.0.0.9:9443"));
}

#[tokio::test]
async fn test_no_ready_pods_defers_delivery() {
    let cluster = FakeCluster::default();
    cluster.add_pod("ssg-0", "10.0.0.0", false);
    let harness = Harness::new(cluster);

    let report = harness
        .delivery()
        .deliver(&target(Strategy::Ephemeral), &request("prod"))
        .await
        .unwrap();

    assert!(report.deferred.is_some());
    assert!(harness.gateway.deliveries().is_empty());
}

#[tokio::test]
async fn test_delete_removes_markers() {
    let harness = Harness::new(FakeCluster::with_pods(2));
    let delivery = harness.delivery();
    let apply = request("prod");
    let key = apply.marker_key.clone();
    delivery.deliver(&target(Strategy::Ephemeral), &apply).await.unwrap();

    let delete = request("prod").with_delete(true);
    let report = delivery.deliver(&target(Strategy::Ephemeral), &delete).await.unwrap();

    assert_eq!(report.succeeded().len(), 2);
    assert_eq!(harness.cluster.pod_label("ssg-0", &key), None);
    assert_eq!(harness.cluster.pod_label("ssg-1", &key), None);

    let again = delivery.deliver(&target(Strategy::Ephemeral), &delete).await.unwrap();
    assert_eq!(again.attempted(), 0);
    assert!(again.fleet_complete());
}

#[tokio::test]
async fn test_db_backed_waits_for_available_deployment() {
    let cluster = FakeCluster::with_pods(3);
    *cluster.deployment.lock().unwrap() = Some(DeploymentInfo {
        name: GATEWAY.to_string(),
        replicas: 3,
        ready_replicas: 2,
        annotations: BTreeMap::new(),
    });
    let harness = Harness::new(cluster);
    let delivery = harness.delivery();
    let request = request("prod");

    let deferred = delivery.deliver(&target(Strategy::DbBacked), &request).await.unwrap();
    assert!(deferred.deferred.is_some());
    assert!(harness.gateway.deliveries().is_empty());

    if let Some(deployment) = harness.cluster.deployment.lock().unwrap().as_mut() {
        deployment.ready_replicas = 3;
    }
    let report = delivery.deliver(&target(Strategy::DbBacked), &request).await.unwrap();

    assert!(report.fleet_complete());
    let deliveries = harness.gateway.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].base_url, "https://ssg.gateways.svc.cluster.local:9443");

    let annotations = harness
        .cluster
        .deployment
        .lock()
        .unwrap()
        .as_ref()
        .map(|deployment| deployment.annotations.clone())
        .unwrap();
    assert_eq!(annotations.get(&request.marker_key), Some(&request.fingerprint));
    for pod in ["ssg-0", "ssg-1", "ssg-2"] {
        assert_eq!(harness.cluster.pod_label(pod, &request.marker_key), None);
    }

    let again = delivery.deliver(&target(Strategy::DbBacked), &request).await.unwrap();
    assert_eq!(again.attempted(), 0);
    assert_eq!(harness.gateway.deliveries().len(), 1);
}
