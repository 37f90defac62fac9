//! In-memory fakes of the cluster, gateway, notifier and state-store seams.

use async_trait::async_trait;
use gateway_config_controller::bundle::BundleKind;
use gateway_config_controller::cache::ChecksumCache;
use gateway_config_controller::cluster::{
    ClusterClient, DeploymentInfo, MarkerPatch, PodInfo, SecretData,
};
use gateway_config_controller::config::ControllerConfig;
use gateway_config_controller::crd::{Gateway, GatewaySpec, NotificationConfig, Repository, StateStore};
use gateway_config_controller::delivery::{
    FleetDelivery, GatewayClient, GatewayUpdateRequest, Notification, Notifier,
};
use gateway_config_controller::error::SyncError;
use gateway_config_controller::repository::{
    CheckoutLocks, Materialized, RepositoryResolver, ResolvedRepository, StateStoreProvider,
};
use gateway_config_controller::statestore::StateStoreClient;
use gateway_config_controller::sync::SyncContext;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const NAMESPACE: &str = "gateways";
pub const GATEWAY: &str = "ssg";
pub const LABEL_KEY: &str = "app.kubernetes.io/name";

/// RFC 7386 JSON merge patch
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[derive(Default)]
pub struct FakeCluster {
    pub pods: Mutex<BTreeMap<String, PodInfo>>,
    pub deployment: Mutex<Option<DeploymentInfo>>,
    pub secrets: Mutex<BTreeMap<String, SecretData>>,
    pub gateways: Mutex<BTreeMap<String, Gateway>>,
    pub repositories: Mutex<BTreeMap<String, Repository>>,
    pub repository_status: Mutex<BTreeMap<String, Value>>,
    pub applied_secrets: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn with_pods(count: usize) -> Self {
        let cluster = Self::default();
        for index in 0..count {
            cluster.add_pod(&format!("{GATEWAY}-{index}"), &format!("10.0.0.{index}"), true);
        }
        cluster
    }

    pub fn add_pod(&self, name: &str, ip: &str, ready: bool) {
        let pod = PodInfo {
            name: name.to_string(),
            ip: Some(ip.to_string()),
            ready,
            labels: BTreeMap::from([(LABEL_KEY.to_string(), GATEWAY.to_string())]),
        };
        self.pods.lock().unwrap().insert(name.to_string(), pod);
    }

    pub fn pod_label(&self, pod: &str, key: &str) -> Option<String> {
        self.pods.lock().unwrap()[pod].labels.get(key).cloned()
    }

    pub fn add_secret(&self, name: &str, secret: SecretData) {
        self.secrets.lock().unwrap().insert(name.to_string(), secret);
    }

    pub fn add_gateway(&self, spec: Value) {
        let mut gateway = Gateway::new(GATEWAY, serde_json::from_value(spec).unwrap());
        gateway.metadata.namespace = Some(NAMESPACE.to_string());
        self.gateways.lock().unwrap().insert(GATEWAY.to_string(), gateway);
    }

    pub fn gateway(&self) -> Gateway {
        self.gateways.lock().unwrap()[GATEWAY].clone()
    }

    /// Change the Gateway spec, keeping its status
    pub fn edit_gateway(&self, edit: impl FnOnce(&mut GatewaySpec)) {
        let mut gateways = self.gateways.lock().unwrap();
        if let Some(gateway) = gateways.get_mut(GATEWAY) {
            edit(&mut gateway.spec);
        }
    }

    pub fn remove_gateway(&self) {
        self.gateways.lock().unwrap().remove(GATEWAY);
    }

    pub fn add_repository(&self, name: &str, spec: Value) {
        let mut repository = Repository::new(name, serde_json::from_value(spec).unwrap());
        repository.metadata.namespace = Some(NAMESPACE.to_string());
        self.repositories
            .lock()
            .unwrap()
            .insert(name.to_string(), repository);
    }

    pub fn management_secret(&self) {
        self.add_secret(
            "ssg-management",
            SecretData::opaque(BTreeMap::from([
                ("username".to_string(), b"admin".to_vec()),
                ("password".to_string(), b"7layer".to_vec()),
            ])),
        );
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_pods(&self, _namespace: &str, selector: &str) -> Result<Vec<PodInfo>, SyncError> {
        let (key, value) = selector.split_once('=').unwrap_or((selector, ""));
        Ok(self
            .pods
            .lock()
            .unwrap()
            .values()
            .filter(|pod| pod.labels.get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn patch_pod_labels(
        &self,
        _namespace: &str,
        pod: &str,
        labels: &MarkerPatch,
    ) -> Result<(), SyncError> {
        let mut pods = self.pods.lock().unwrap();
        let pod = pods
            .get_mut(pod)
            .ok_or_else(|| SyncError::transient(format!("pod {pod} not found")))?;
        for (key, value) in labels {
            match value {
                Some(value) => pod.labels.insert(key.clone(), value.clone()),
                None => pod.labels.remove(key),
            };
        }
        Ok(())
    }

    async fn get_deployment(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<DeploymentInfo>, SyncError> {
        Ok(self.deployment.lock().unwrap().clone())
    }

    async fn patch_deployment_annotations(
        &self,
        _namespace: &str,
        _name: &str,
        annotations: &MarkerPatch,
    ) -> Result<(), SyncError> {
        let mut deployment = self.deployment.lock().unwrap();
        let deployment = deployment
            .as_mut()
            .ok_or_else(|| SyncError::transient("deployment not found"))?;
        for (key, value) in annotations {
            match value {
                Some(value) => deployment.annotations.insert(key.clone(), value.clone()),
                None => deployment.annotations.remove(key),
            };
        }
        Ok(())
    }

    async fn get_secret(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<SecretData>, SyncError> {
        Ok(self.secrets.lock().unwrap().get(name).cloned())
    }

    async fn apply_secret(
        &self,
        _namespace: &str,
        name: &str,
        secret: &SecretData,
    ) -> Result<(), SyncError> {
        self.applied_secrets.lock().unwrap().push(name.to_string());
        self.add_secret(name, secret.clone());
        Ok(())
    }

    async fn get_gateway(&self, _namespace: &str, name: &str) -> Result<Option<Gateway>, SyncError> {
        Ok(self.gateways.lock().unwrap().get(name).cloned())
    }

    async fn patch_gateway_status(
        &self,
        _namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<(), SyncError> {
        let mut gateways = self.gateways.lock().unwrap();
        let Some(gateway) = gateways.get_mut(name) else {
            return Ok(());
        };
        let mut current = serde_json::to_value(gateway.status.clone().unwrap_or_default())?;
        merge_patch(&mut current, &status);
        gateway.status = Some(serde_json::from_value(current)?);
        Ok(())
    }

    async fn get_repository(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<Repository>, SyncError> {
        Ok(self.repositories.lock().unwrap().get(name).cloned())
    }

    async fn patch_repository_status(
        &self,
        _namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<(), SyncError> {
        let mut statuses = self.repository_status.lock().unwrap();
        let current = statuses.entry(name.to_string()).or_insert(Value::Null);
        merge_patch(current, &status);
        Ok(())
    }

    async fn get_state_store(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<StateStore>, SyncError> {
        Ok(None)
    }
}

/// One recorded delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub base_url: String,
    pub kind: BundleKind,
    pub fingerprint: String,
    pub delete: bool,
    pub body: String,
}

/// Parks deliveries until released
#[derive(Default)]
pub struct DeliveryGate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct FakeGatewayClient {
    pub delivered: Mutex<Vec<Delivered>>,
    /// Base URLs that answer with an error
    pub failing: Mutex<BTreeSet<String>>,
    pub gate: Mutex<Option<Arc<DeliveryGate>>>,
}

impl FakeGatewayClient {
    /// Hold every following delivery until the returned gate is released
    pub fn hold(&self) -> Arc<DeliveryGate> {
        let gate = Arc::new(DeliveryGate::default());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn fail(&self, base_url: &str) {
        self.failing.lock().unwrap().insert(base_url.to_string());
    }

    pub fn deliveries(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayClient for FakeGatewayClient {
    async fn apply(&self, base_url: &str, request: &GatewayUpdateRequest) -> Result<(), SyncError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.failing.lock().unwrap().contains(base_url) {
            return Err(SyncError::transient(format!("{base_url} unavailable")));
        }
        let body = match &request.payload {
            gateway_config_controller::bundle::Payload::Graphman(document) => document.to_string(),
            gateway_config_controller::bundle::Payload::Restman(documents) => {
                documents.values().cloned().collect::<Vec<_>>().join("\n")
            }
        };
        self.delivered.lock().unwrap().push(Delivered {
            base_url: base_url.to_string(),
            kind: request.kind,
            fingerprint: request.fingerprint.clone(),
            delete: request.delete,
            body,
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        _config: &NotificationConfig,
        notification: &Notification,
    ) -> Result<(), SyncError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    pub values: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl StateStoreClient for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Resolves every repository to the same in-memory files, or to a directory once one is set
#[derive(Default)]
pub struct StaticResolver {
    pub files: Mutex<BTreeMap<String, Vec<u8>>>,
    pub directory: Mutex<Option<PathBuf>>,
    /// Time each resolution takes
    pub latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl StaticResolver {
    pub fn set(&self, name: &str, content: Value) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), content.to_string().into_bytes());
    }

    pub fn use_directory(&self, path: &Path) {
        *self.directory.lock().unwrap() = Some(path.to_path_buf());
    }
}

#[async_trait]
impl RepositoryResolver for StaticResolver {
    async fn resolve(&self, _repository: &Repository) -> Result<ResolvedRepository, SyncError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(directory) = self.directory.lock().unwrap().clone() {
            return Ok(ResolvedRepository {
                fingerprint: "0a1b2c3d".to_string(),
                materialized: Materialized::Directory(directory),
            });
        }
        let files = self.files.lock().unwrap().clone();
        let joined: Vec<u8> = files.values().flatten().copied().collect();
        Ok(ResolvedRepository {
            fingerprint: gateway_config_controller::bundle::sha224_hex(&joined),
            materialized: Materialized::Files(files),
        })
    }
}

/// State-store provider that is never configured in these tests
pub struct NoStateStores;

#[async_trait]
impl StateStoreProvider for NoStateStores {
    async fn open(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<(StateStore, Arc<dyn StateStoreClient>), SyncError> {
        Err(SyncError::configuration(format!("state store {name} not found")))
    }
}

/// Fakes wired into a sync context
pub struct Harness {
    pub cluster: Arc<FakeCluster>,
    pub gateway: Arc<FakeGatewayClient>,
    pub notifier: Arc<RecordingNotifier>,
    pub resolver: Arc<StaticResolver>,
    pub context: Arc<SyncContext>,
}

impl Harness {
    pub fn new(cluster: FakeCluster) -> Self {
        Self::with_cache_ttl(cluster, Duration::from_secs(30))
    }

    pub fn with_cache_ttl(cluster: FakeCluster, ttl: Duration) -> Self {
        let cluster = Arc::new(cluster);
        let gateway = Arc::new(FakeGatewayClient::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let resolver = Arc::new(StaticResolver::default());
        let delivery = FleetDelivery::new(cluster.clone(), gateway.clone(), notifier.clone());
        let context = Arc::new(SyncContext {
            config: ControllerConfig::default(),
            cluster: cluster.clone(),
            delivery,
            resolver: resolver.clone(),
            state_stores: Arc::new(NoStateStores),
            cache: Arc::new(ChecksumCache::new(ttl)),
            checkout_locks: CheckoutLocks::default(),
        });
        Self {
            cluster,
            gateway,
            notifier,
            resolver,
            context,
        }
    }

    pub fn delivery(&self) -> FleetDelivery {
        self.context.delivery.clone()
    }
}
