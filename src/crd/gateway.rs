//! # Gateway
//!
//! Desired configuration of a gateway fleet.

use super::{default_true, GatewayStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gateway Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: gateway-config.io/v1
/// kind: Gateway
/// metadata:
///   name: ssg
///   namespace: gateways
/// spec:
///   replicas: 3
///   management:
///     secretName: ssg-management
///   repositoryReferences:
///     - name: policies
///       directories: ["tree/services"]
///   clusterProperties:
///     enabled: true
///     properties:
///       - name: env
///         value: prod
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Gateway",
    group = "gateway-config.io",
    version = "v1",
    namespaced,
    status = "GatewayStatus",
    shortname = "gw",
    printcolumn = r#"{"name":"Ready", "type":"boolean", "jsonPath":".status.ready"}, {"name":"Management Pod", "type":"string", "jsonPath":".status.managementPod"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// Desired fleet size
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    /// Management API access
    pub management: ManagementConfig,
    /// Repositories whose bundles are applied to the fleet
    #[serde(default)]
    pub repository_references: Vec<RepositoryReference>,
    /// Opaque or TLS Secrets applied as stored passwords or private keys
    #[serde(default)]
    pub external_secrets: Vec<ExternalReference>,
    /// TLS Secrets applied as private keys
    #[serde(default)]
    pub external_keys: Vec<ExternalReference>,
    /// Secrets holding PEM certificates applied as trusted certificates
    #[serde(default)]
    pub external_certs: Vec<ExternalReference>,
    #[serde(default)]
    pub cluster_properties: ClusterPropertiesConfig,
    #[serde(default)]
    pub listen_ports: ListenPortsConfig,
    /// OAuth toolkit configuration
    #[serde(default)]
    pub otk: Option<OtkConfig>,
    /// Per-domain sync interval overrides in seconds, keyed by domain name
    /// (e.g. `repositories: 30`)
    #[serde(default)]
    pub sync_intervals: BTreeMap<String, u64>,
    /// Skip all synchronization for this Gateway
    #[serde(default)]
    pub suspend: bool,
}

fn default_replicas() -> i32 {
    1
}

/// Management API access configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagementConfig {
    /// Secret holding `username` and `password` for the management API
    pub secret_name: String,
    /// Management port (defaults to the controller's configured port)
    #[serde(default)]
    pub port: Option<u16>,
    /// Service used for DB-backed delivery (defaults to the Gateway name)
    #[serde(default)]
    pub service_name: Option<String>,
    /// Shared database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Shared database configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Gateways share persistent state through an external database
    #[serde(default)]
    pub enabled: bool,
}

/// Reference from a Gateway to a Repository resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryReference {
    /// Name of the Repository resource in the Gateway's namespace
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directories of the repository that contribute bundle files.
    /// Empty means the whole repository.
    #[serde(default)]
    pub directories: Vec<String>,
    /// Passphrase used by the gateway to decrypt sensitive bundle contents
    #[serde(default)]
    pub encryption: Option<EncryptionReference>,
    /// Webhook notified after each delivery cycle
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
}

/// Secret key holding a bundle encryption passphrase
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionReference {
    pub existing_secret: String,
    pub key: String,
}

/// Notification webhook target
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,
    pub url: String,
    /// Extra headers sent with the webhook
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Reference to a Kubernetes Secret applied to the gateway
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalReference {
    /// Secret name in the Gateway's namespace
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    /// Stored passwords may be referenced from policy context variables
    #[serde(default)]
    pub variable_referencable: bool,
    /// Private key alias (defaults to the Secret name)
    #[serde(default)]
    pub alias: Option<String>,
    /// Special purpose of a private key, e.g. `SSL`
    #[serde(default)]
    pub key_usage_type: Option<String>,
    /// Trusted certificates: treat as trust anchor
    #[serde(default)]
    pub trust_anchor: bool,
    /// Trusted certificates: enforce hostname verification
    #[serde(default)]
    pub verify_hostname: bool,
    /// Trusted certificates: trust purposes, e.g. `SSL`, `SIGNING_CLIENT_CERTS`
    #[serde(default)]
    pub trusted_for: Vec<String>,
}

/// Cluster-wide properties
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPropertiesConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub properties: Vec<ClusterProperty>,
}

/// A single cluster-wide property
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ClusterProperty {
    pub name: String,
    pub value: String,
}

/// Listen-port topology
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenPortsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ports: Vec<ListenPort>,
}

/// A gateway listen port
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenPort {
    pub name: String,
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Enabled features, e.g. `Published service message input`
    #[serde(default)]
    pub enabled_features: Vec<String>,
    #[serde(default)]
    pub tls: Option<ListenPortTls>,
}

fn default_protocol() -> String {
    "HTTPS".to_string()
}

/// TLS settings of a listen port
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenPortTls {
    #[serde(default)]
    pub enabled: bool,
    /// `NONE`, `OPTIONAL` or `REQUIRED`
    #[serde(default)]
    pub client_authentication: Option<String>,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub cipher_suites: Vec<String>,
    /// Alias of the private key used for this port
    #[serde(default)]
    pub private_key: Option<String>,
}

/// OAuth toolkit deployment role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OtkType {
    #[default]
    Single,
    Internal,
    Dmz,
}

impl OtkType {
    pub fn as_str(self) -> &'static str {
        match self {
            OtkType::Single => "single",
            OtkType::Internal => "internal",
            OtkType::Dmz => "dmz",
        }
    }
}

/// OAuth toolkit configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OtkConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub r#type: OtkType,
    /// Paired internal Gateway (for a DMZ gateway)
    #[serde(default)]
    pub internal_gateway_reference: Option<String>,
    /// Paired DMZ Gateway (for an internal gateway)
    #[serde(default)]
    pub dmz_gateway_reference: Option<String>,
    #[serde(default)]
    pub internal_gateway_port: Option<u16>,
    #[serde(default)]
    pub dmz_gateway_port: Option<u16>,
    #[serde(default)]
    pub database: OtkDatabaseConfig,
    /// Apply role-dependent policy overrides
    #[serde(default = "default_true")]
    pub policy_sync: bool,
    /// Exchange TLS certificates with the paired gateway
    #[serde(default = "default_true")]
    pub certificate_sync: bool,
    /// TLS Secret whose certificate this gateway publishes to its peer
    #[serde(default)]
    pub tls_secret_name: Option<String>,
}

/// OAuth toolkit database configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OtkDatabaseConfig {
    /// `mysql`, `oracle` or `cassandra`
    #[serde(default = "default_otk_database_type")]
    pub r#type: String,
    /// JDBC/Cassandra connection name configured on the gateway
    #[serde(default = "default_otk_connection_name")]
    pub connection_name: String,
    /// Schema and maintenance handled outside the gateway
    #[serde(default)]
    pub externally_managed: bool,
    /// Install the scheduled database maintenance tasks
    #[serde(default = "default_true")]
    pub maintenance_tasks: bool,
}

impl Default for OtkDatabaseConfig {
    fn default() -> Self {
        Self {
            r#type: default_otk_database_type(),
            connection_name: default_otk_connection_name(),
            externally_managed: false,
            maintenance_tasks: true,
        }
    }
}

fn default_otk_database_type() -> String {
    "mysql".to_string()
}

fn default_otk_connection_name() -> String {
    "OAuth".to_string()
}

impl Gateway {
    /// `<namespace>/<name>`, used as the instance part of scheduler tags and cache keys
    pub fn instance_key(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or("default"),
            self.metadata.name.as_deref().unwrap_or("unknown")
        )
    }

    pub fn gateway_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("unknown")
    }

    pub fn gateway_namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or("default")
    }

    /// OTK configuration, only when enabled
    pub fn otk(&self) -> Option<&OtkConfig> {
        self.spec.otk.as_ref().filter(|otk| otk.enabled)
    }
}
