//! # StateStore
//!
//! Remote key-value store holding repository snapshots.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// StateStore Custom Resource Definition
///
/// Keys written by the controller follow
/// `<group>:<storeId>:repository:<storageSecretName>:latest` and `...:delta`.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "StateStore",
    group = "gateway-config.io",
    version = "v1",
    namespaced,
    shortname = "ss"
)]
#[serde(rename_all = "camelCase")]
pub struct StateStoreSpec {
    pub redis: RedisConfig,
    /// First segment of every key
    #[serde(default = "default_group")]
    pub group: String,
    /// Second segment of every key
    #[serde(default = "default_store_id")]
    pub store_id: String,
}

/// Redis connection settings
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisConfig {
    /// `redis://host:port` or `rediss://host:port`
    pub url: String,
    #[serde(default)]
    pub database: Option<i64>,
    /// Secret holding `username` and `password`
    #[serde(default)]
    pub existing_secret: Option<String>,
}

fn default_group() -> String {
    "l7".to_string()
}

fn default_store_id() -> String {
    "default".to_string()
}

impl StateStoreSpec {
    /// Key of the combined snapshot of a repository
    pub fn latest_key(&self, storage_secret_name: &str) -> String {
        format!(
            "{}:{}:repository:{}:latest",
            self.group, self.store_id, storage_secret_name
        )
    }

    /// Key of the last change-set of a repository
    pub fn delta_key(&self, storage_secret_name: &str) -> String {
        format!(
            "{}:{}:repository:{}:delta",
            self.group, self.store_id, storage_secret_name
        )
    }
}
