//! # Synchronization Jobs
//!
//! One recurring job per Gateway and configuration domain. A job reads the
//! Gateway, builds the domain's desired bundle, and hands it to fleet delivery
//! through the checksum gate. A job whose Gateway is gone, or whose domain was
//! disabled, deregisters itself.

mod external;
mod job;
mod management;
mod otk;
mod pipeline;
mod properties;
mod repositories;

pub use job::DomainJob;
pub use pipeline::{fleet_target, load_credentials};

use crate::cache::ChecksumCache;
use crate::cluster::ClusterClient;
use crate::config::ControllerConfig;
use crate::crd::{Gateway, OtkType};
use crate::delivery::FleetDelivery;
use crate::repository::{CheckoutLocks, RepositoryResolver, StateStoreProvider};
use crate::scheduler::Scheduler;
use std::sync::Arc;
use std::time::Duration;

/// Shared collaborators of all domain jobs
pub struct SyncContext {
    pub config: ControllerConfig,
    pub cluster: Arc<dyn ClusterClient>,
    pub delivery: FleetDelivery,
    pub resolver: Arc<dyn RepositoryResolver>,
    pub state_stores: Arc<dyn StateStoreProvider>,
    pub cache: Arc<ChecksumCache<String>>,
    pub checkout_locks: CheckoutLocks,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Configuration domains synchronized into a gateway fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncDomain {
    Repositories,
    ExternalSecrets,
    ExternalKeys,
    ExternalCerts,
    ClusterProperties,
    ListenPorts,
    OtkMaintenance,
    OtkPolicies,
    OtkCertificates,
    ManagementPod,
}

impl SyncDomain {
    pub const ALL: [SyncDomain; 10] = [
        SyncDomain::Repositories,
        SyncDomain::ExternalSecrets,
        SyncDomain::ExternalKeys,
        SyncDomain::ExternalCerts,
        SyncDomain::ClusterProperties,
        SyncDomain::ListenPorts,
        SyncDomain::OtkMaintenance,
        SyncDomain::OtkPolicies,
        SyncDomain::OtkCertificates,
        SyncDomain::ManagementPod,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncDomain::Repositories => "repositories",
            SyncDomain::ExternalSecrets => "external-secrets",
            SyncDomain::ExternalKeys => "external-keys",
            SyncDomain::ExternalCerts => "external-certs",
            SyncDomain::ClusterProperties => "cluster-properties",
            SyncDomain::ListenPorts => "listen-ports",
            SyncDomain::OtkMaintenance => "otk-maintenance",
            SyncDomain::OtkPolicies => "otk-policies",
            SyncDomain::OtkCertificates => "otk-certificates",
            SyncDomain::ManagementPod => "management-pod",
        }
    }

    /// Whether `gateway` currently wants this domain synchronized.
    ///
    /// Repositories and external references stay enabled while removed
    /// entries still have a last-applied record, so their deletes can be delivered.
    pub fn is_enabled(self, gateway: &Gateway) -> bool {
        let spec = &gateway.spec;
        match self {
            SyncDomain::Repositories => {
                !spec.repository_references.is_empty()
                    || gateway.status.as_ref().is_some_and(|status| {
                        status
                            .last_applied
                            .keys()
                            .any(|key| key.starts_with(repositories::STATUS_KEY_PREFIX))
                    })
            }
            SyncDomain::ExternalSecrets => {
                !spec.external_secrets.is_empty() || self.has_applied_entities(gateway)
            }
            SyncDomain::ExternalKeys => {
                !spec.external_keys.is_empty() || self.has_applied_entities(gateway)
            }
            SyncDomain::ExternalCerts => {
                !spec.external_certs.is_empty() || self.has_applied_entities(gateway)
            }
            SyncDomain::ClusterProperties => spec.cluster_properties.enabled,
            SyncDomain::ListenPorts => spec.listen_ports.enabled,
            SyncDomain::OtkMaintenance => gateway.otk().is_some_and(|otk| {
                otk.r#type != OtkType::Dmz
                    && otk.database.maintenance_tasks
                    && !otk.database.externally_managed
            }),
            SyncDomain::OtkPolicies => gateway.otk().is_some_and(|otk| otk.policy_sync),
            SyncDomain::OtkCertificates => gateway
                .otk()
                .is_some_and(|otk| otk.certificate_sync && otk.r#type != OtkType::Single),
            SyncDomain::ManagementPod => true,
        }
    }

    /// Entities applied under this domain's key that may still need tombstones
    fn has_applied_entities(self, gateway: &Gateway) -> bool {
        gateway
            .status
            .as_ref()
            .and_then(|status| status.last_applied.get(self.as_str()))
            .is_some_and(|applied| !applied.entities.is_empty())
    }

    /// Per-Gateway override from `spec.syncIntervals`, else the controller default
    pub fn interval(self, gateway: &Gateway, default: Duration) -> Duration {
        gateway
            .spec
            .sync_intervals
            .get(self.as_str())
            .filter(|secs| **secs > 0)
            .map_or(default, |secs| Duration::from_secs(*secs))
    }
}

impl std::fmt::Display for SyncDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduler tag `<namespace>/<gateway>-<domain>`
pub fn job_tag(namespace: &str, gateway: &str, domain: SyncDomain) -> String {
    format!("{namespace}/{gateway}-{}", domain.as_str())
}

/// Register every enabled domain job of `gateway`. Returns the number of new registrations.
pub async fn register_gateway_jobs(
    scheduler: &Scheduler,
    context: &Arc<SyncContext>,
    gateway: &Gateway,
) -> usize {
    let namespace = gateway.gateway_namespace();
    let name = gateway.gateway_name();
    let mut registered = 0;
    for domain in SyncDomain::ALL {
        if !domain.is_enabled(gateway) {
            continue;
        }
        let job = Arc::new(DomainJob::new(
            Arc::clone(context),
            namespace.to_string(),
            name.to_string(),
            domain,
        ));
        let interval = domain.interval(gateway, context.config.default_sync_interval);
        if scheduler
            .register(job_tag(namespace, name, domain), interval, job)
            .await
        {
            registered += 1;
        }
    }
    registered
}
