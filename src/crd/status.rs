//! # Gateway Status
//!
//! Status types for tracking per-domain synchronization state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of the Gateway resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    /// All ready pods carry every current marker
    #[serde(default)]
    pub ready: bool,
    /// Pod elected for management API access
    #[serde(default)]
    pub management_pod: Option<String>,
    /// Per-pod readiness
    #[serde(default)]
    pub gateways: Vec<GatewayPodStatus>,
    /// Per-repository-reference status
    #[serde(default)]
    pub repository_status: Vec<RepositoryReferenceStatus>,
    /// Last-applied state keyed by domain key (e.g. `cluster-properties`,
    /// `repository-policies`)
    #[serde(default)]
    pub last_applied: BTreeMap<String, AppliedState>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Readiness of a single gateway pod
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPodStatus {
    pub name: String,
    pub ready: bool,
    #[serde(default)]
    pub ip: Option<String>,
}

/// Status of one repository reference
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryReferenceStatus {
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub storage_secret_name: Option<String>,
    #[serde(default)]
    pub last_sync: Option<String>,
}

/// What was last applied for one domain key
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppliedState {
    pub fingerprint: String,
    /// Entities that may need a tombstone once removed from desired state
    #[serde(default)]
    pub entities: Vec<EntityRef>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Identity of a bundle entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
pub struct EntityRef {
    /// Bundle section, e.g. `secrets`
    pub kind: String,
    pub name: String,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
