//! # Cluster Access
//!
//! The Kubernetes operations the sync engine needs, behind the [`ClusterClient`]
//! seam: pod and deployment status, label and annotation markers, Secrets, and
//! the Gateway/Repository/StateStore resources.
//!
//! Reads return `Ok(None)` for objects that do not exist; callers decide whether a
//! missing object is a configuration error.

use crate::constants::FIELD_MANAGER;
use crate::crd::{Gateway, Repository, StateStore};
use crate::error::{is_not_found, SyncError};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Secret};
use k8s_openapi::ByteString;
use kube::api::{Api, ListParams, ObjectMeta, Patch, PatchParams};
use kube::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A gateway pod as seen by the delivery strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub ip: Option<String>,
    pub ready: bool,
    pub labels: BTreeMap<String, String>,
}

/// Deployment availability and annotations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentInfo {
    pub name: String,
    /// Desired replicas
    pub replicas: i32,
    pub ready_replicas: i32,
    pub annotations: BTreeMap<String, String>,
}

impl DeploymentInfo {
    /// Every desired replica is ready
    pub fn is_available(&self) -> bool {
        self.ready_replicas >= self.replicas
    }
}

/// Secret contents, decoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretData {
    /// Kubernetes Secret type, e.g. `Opaque` or `kubernetes.io/tls`
    pub type_: String,
    pub data: BTreeMap<String, Vec<u8>>,
    pub annotations: BTreeMap<String, String>,
}

impl SecretData {
    pub fn opaque(data: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            type_: "Opaque".to_string(),
            data,
            annotations: BTreeMap::new(),
        }
    }

    /// Value of `key` as UTF-8, if present and valid
    pub fn string(&self, key: &str) -> Option<String> {
        self.data
            .get(key)
            .and_then(|value| String::from_utf8(value.clone()).ok())
    }

    pub fn is_tls(&self) -> bool {
        self.type_ == "kubernetes.io/tls"
    }
}

/// Label or annotation changes; `None` removes the key
pub type MarkerPatch = BTreeMap<String, Option<String>>;

/// Kubernetes operations used by the sync engine
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Pods in `namespace` matching `selector` (`key=value`)
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodInfo>, SyncError>;

    async fn patch_pod_labels(
        &self,
        namespace: &str,
        pod: &str,
        labels: &MarkerPatch,
    ) -> Result<(), SyncError>;

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DeploymentInfo>, SyncError>;

    async fn patch_deployment_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &MarkerPatch,
    ) -> Result<(), SyncError>;

    async fn get_secret(&self, namespace: &str, name: &str)
        -> Result<Option<SecretData>, SyncError>;

    /// Create or replace a Secret owned by the controller
    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        secret: &SecretData,
    ) -> Result<(), SyncError>;

    async fn get_gateway(&self, namespace: &str, name: &str) -> Result<Option<Gateway>, SyncError>;

    /// Merge-patch the Gateway status with `status`
    async fn patch_gateway_status(
        &self,
        namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<(), SyncError>;

    async fn get_repository(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Repository>, SyncError>;

    async fn patch_repository_status(
        &self,
        namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<(), SyncError>;

    async fn get_state_store(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StateStore>, SyncError>;
}

/// [`ClusterClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Turn a 404 into `None`
fn optional<T>(result: Result<T, kube::Error>) -> Result<Option<T>, SyncError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn pod_info(pod: Pod) -> PodInfo {
    let status = pod.status.unwrap_or_default();
    let ready = status
        .conditions
        .unwrap_or_default()
        .iter()
        .any(|condition| condition.type_ == "Ready" && condition.status == "True");
    PodInfo {
        name: pod.metadata.name.unwrap_or_default(),
        ip: status.pod_ip,
        ready,
        labels: pod.metadata.labels.unwrap_or_default(),
    }
}

fn marker_patch(field: &str, markers: &MarkerPatch) -> Value {
    json!({ "metadata": { (field): markers } })
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodInfo>, SyncError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(selector)).await?;
        Ok(pods.items.into_iter().map(pod_info).collect())
    }

    async fn patch_pod_labels(
        &self,
        namespace: &str,
        pod: &str,
        labels: &MarkerPatch,
    ) -> Result<(), SyncError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            pod,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(marker_patch("labels", labels)),
        )
        .await?;
        debug!(pod = %pod, "Patched pod labels");
        Ok(())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DeploymentInfo>, SyncError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(optional(api.get(name).await)?.map(|deployment| {
            let status = deployment.status.unwrap_or_default();
            DeploymentInfo {
                name: deployment.metadata.name.unwrap_or_default(),
                replicas: deployment.spec.and_then(|s| s.replicas).unwrap_or(1),
                ready_replicas: status.ready_replicas.unwrap_or(0),
                annotations: deployment.metadata.annotations.unwrap_or_default(),
            }
        }))
    }

    async fn patch_deployment_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &MarkerPatch,
    ) -> Result<(), SyncError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(marker_patch("annotations", annotations)),
        )
        .await?;
        Ok(())
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SecretData>, SyncError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(optional(api.get(name).await)?.map(|secret| SecretData {
            type_: secret.type_.unwrap_or_else(|| "Opaque".to_string()),
            data: secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key, value.0))
                .collect(),
            annotations: secret.metadata.annotations.unwrap_or_default(),
        }))
    }

    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        secret: &SecretData,
    ) -> Result<(), SyncError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let object = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                annotations: Some(secret.annotations.clone()),
                ..ObjectMeta::default()
            },
            type_: Some(secret.type_.clone()),
            data: Some(
                secret
                    .data
                    .iter()
                    .map(|(key, value)| (key.clone(), ByteString(value.clone())))
                    .collect(),
            ),
            ..Secret::default()
        };
        // Server-side apply needs apiVersion/kind in the body
        let mut body = serde_json::to_value(&object)?;
        body["apiVersion"] = json!("v1");
        body["kind"] = json!("Secret");
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(body),
        )
        .await?;
        debug!(secret = %name, namespace = %namespace, "Applied secret");
        Ok(())
    }

    async fn get_gateway(&self, namespace: &str, name: &str) -> Result<Option<Gateway>, SyncError> {
        let api: Api<Gateway> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await)
    }

    async fn patch_gateway_status(
        &self,
        namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<(), SyncError> {
        let api: Api<Gateway> = Api::namespaced(self.client.clone(), namespace);
        match api
            .patch_status(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(json!({ "status": status })),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                warn!(gateway = %name, "Gateway deleted before status update");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_repository(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Repository>, SyncError> {
        let api: Api<Repository> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await)
    }

    async fn patch_repository_status(
        &self,
        namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<(), SyncError> {
        let api: Api<Repository> = Api::namespaced(self.client.clone(), namespace);
        match api
            .patch_status(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(json!({ "status": status })),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                warn!(repository = %name, "Repository deleted before status update");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_state_store(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StateStore>, SyncError> {
        let api: Api<StateStore> = Api::namespaced(self.client.clone(), namespace);
        optional(api.get(name).await)
    }
}
