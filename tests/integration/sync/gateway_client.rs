//! Management API contract of the HTTP gateway client and the webhook notifier.

use gateway_config_controller::bundle::{BundleKind, DesiredState, Payload};
use gateway_config_controller::crd::{ClusterProperty, NotificationConfig};
use gateway_config_controller::delivery::{
    GatewayClient, GatewayUpdateRequest, HttpGatewayClient, ManagementCredentials, Notification,
    Notifier, WebhookNotifier,
};
use std::collections::BTreeMap;
use wiremock::matchers::{basic_auth, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

fn credentials() -> ManagementCredentials {
    ManagementCredentials {
        username: "admin".to_string(),
        password: Zeroizing::new("7layer".to_string()),
    }
}

fn properties_request() -> GatewayUpdateRequest {
    let built = DesiredState::ClusterProperties(vec![ClusterProperty {
        name: "env".to_string(),
        value: "prod".to_string(),
    }])
    .build(&[])
    .unwrap();
    GatewayUpdateRequest::new(
        built,
        "cluster-properties.gateway-config.io/ssg".to_string(),
        credentials(),
    )
}

#[tokio::test]
async fn test_graphman_bundle_is_posted_with_auth_and_passphrase() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphman"))
        .and(basic_auth("admin", "7layer"))
        .and(header("l7-passphrase", "Y2hhbmdlaXQ="))
        .and(body_partial_json(serde_json::json!({
            "clusterProperties": [{"name": "env", "value": "prod"}]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let request =
        properties_request().with_passphrase(Some(Zeroizing::new("changeit".to_string())));
    HttpGatewayClient::with_client(reqwest::Client::new())
        .apply(&server.uri(), &request)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_non_success_status_is_transient_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphman"))
        .respond_with(ResponseTemplate::new(500).set_body_string("bundle rejected"))
        .mount(&server)
        .await;

    let error = HttpGatewayClient::with_client(reqwest::Client::new())
        .apply(&server.uri(), &properties_request())
        .await
        .unwrap_err();

    assert!(error.is_transient());
    assert!(error.to_string().contains("HTTP 500"));
    assert!(error.to_string().contains("bundle rejected"));
}

#[tokio::test]
async fn test_restman_documents_are_posted_one_by_one() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/restman"))
        .and(header("content-type", "application/xml"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let request = GatewayUpdateRequest {
        kind: BundleKind::Repository,
        payload: Payload::Restman(BTreeMap::from([
            ("a.bundle".to_string(), "<Bundle/>".to_string()),
            ("b.bundle".to_string(), "<Bundle/>".to_string()),
        ])),
        fingerprint: "abc".to_string(),
        delete: false,
        marker_key: "repository.gateway-config.io/legacy".to_string(),
        credentials: credentials(),
        passphrase: None,
        notification: None,
    };
    HttpGatewayClient::with_client(reqwest::Client::new())
        .apply(&format!("{}/", server.uri()), &request)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_webhook_notification_carries_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/deploy"))
        .and(header("x-team", "gateways"))
        .and(body_partial_json(serde_json::json!({
            "repository": "policies",
            "commit": "abc123",
            "deployment": "ssg",
            "pods": {"ssg-0": true}
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = NotificationConfig {
        enabled: true,
        url: format!("{}/deploy", server.uri()),
        headers: BTreeMap::from([("x-team".to_string(), "gateways".to_string())]),
    };
    let notification = Notification {
        repository: "policies".to_string(),
        commit: "abc123".to_string(),
        deployment: "ssg".to_string(),
        text: "repository bundle applied to 1/1 targets of ssg".to_string(),
        pods: BTreeMap::from([("ssg-0".to_string(), true)]),
    };
    WebhookNotifier::new(reqwest::Client::new())
        .notify(&config, &notification)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_webhook_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let config = NotificationConfig {
        enabled: true,
        url: server.uri(),
        headers: BTreeMap::new(),
    };
    let notification = Notification {
        repository: "policies".to_string(),
        commit: "abc123".to_string(),
        deployment: "ssg".to_string(),
        text: String::new(),
        pods: BTreeMap::new(),
    };
    let result = WebhookNotifier::new(reqwest::Client::new())
        .notify(&config, &notification)
        .await;
    assert!(result.is_err());
}
