//! # Repository
//!
//! A configuration source referenced by Gateways.

use super::default_true;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Repository Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: gateway-config.io/v1
/// kind: Repository
/// metadata:
///   name: policies
/// spec:
///   type: git
///   endpoint: https://github.com/example/gateway-policies
///   branch: main
///   auth:
///     existingSecretName: policies-git
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Repository",
    group = "gateway-config.io",
    version = "v1",
    namespaced,
    status = "RepositoryStatus",
    shortname = "repo",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}, {"name":"Ready", "type":"boolean", "jsonPath":".status.ready"}, {"name":"Commit", "type":"string", "jsonPath":".status.commit"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub r#type: RepositoryType,
    /// `https://` or `ssh://` git remote, or `https://` archive URL
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Branch to track; re-pulled on every sync
    #[serde(default)]
    pub branch: Option<String>,
    /// Tag to pin; fetched at most once per process
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub auth: Option<RepositoryAuth>,
    /// Secret read directly for `local` repositories
    #[serde(default)]
    pub local_reference: Option<LocalReference>,
    /// StateStore resource used as source (`statestore` type) or as snapshot sink
    #[serde(default)]
    pub state_store_reference: Option<String>,
    /// Key read from the state store for `statestore` repositories
    #[serde(default)]
    pub state_store_key: Option<String>,
    #[serde(default)]
    pub format: BundleFormat,
}

/// Source type of a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    Git,
    Http,
    Local,
    #[serde(rename = "statestore")]
    StateStore,
}

impl RepositoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            RepositoryType::Git => "git",
            RepositoryType::Http => "http",
            RepositoryType::Local => "local",
            RepositoryType::StateStore => "statestore",
        }
    }
}

/// Bundle format stored in a repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BundleFormat {
    /// JSON bundles applied through `/graphman`
    #[default]
    Graphman,
    /// Legacy XML bundles applied through `/restman`
    Restman,
}

/// Credentials for a remote repository
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryAuth {
    /// Secret holding `USERNAME`/`TOKEN` (basic) or `SSH_KEY` (ssh)
    pub existing_secret_name: String,
    #[serde(default)]
    pub r#type: RepositoryAuthType,
}

/// Authentication scheme of a remote repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryAuthType {
    #[default]
    Basic,
    Ssh,
    None,
}

/// Secret backing a `local` repository
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalReference {
    pub secret_name: String,
}

/// Published state of a Repository
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStatus {
    #[serde(default)]
    pub ready: bool,
    /// Commit hash or content hash of the last resolved content
    #[serde(default)]
    pub commit: Option<String>,
    /// Secret holding the gzip-compressed bundle snapshot
    #[serde(default)]
    pub storage_secret_name: Option<String>,
    /// RFC3339 time of the last successful sync
    #[serde(default)]
    pub last_updated: Option<String>,
    /// Full and delta snapshots were written to the state store
    #[serde(default)]
    pub state_store_synced: bool,
    /// Human-readable reason when not ready or when the snapshot was skipped
    #[serde(default)]
    pub message: Option<String>,
}

impl Repository {
    pub fn repository_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("unknown")
    }

    pub fn repository_namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or("default")
    }

    /// Name of the Secret holding the compressed snapshot
    pub fn storage_secret_name(&self) -> String {
        format!("{}-repository", self.repository_name())
    }

    /// Reference being tracked, tag preferred over branch
    pub fn reference(&self) -> Option<&str> {
        self.spec.tag.as_deref().or(self.spec.branch.as_deref())
    }
}
