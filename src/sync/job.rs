//! The scheduler job driving one domain of one Gateway.

use super::{external, management, otk, properties, repositories, SyncContext, SyncDomain};
use crate::error::SyncError;
use crate::scheduler::{Job, JobOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// Recurring synchronization of one domain into one gateway fleet
pub struct DomainJob {
    context: Arc<SyncContext>,
    namespace: String,
    gateway: String,
    domain: SyncDomain,
}

impl std::fmt::Debug for DomainJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainJob")
            .field("namespace", &self.namespace)
            .field("gateway", &self.gateway)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl DomainJob {
    pub fn new(
        context: Arc<SyncContext>,
        namespace: String,
        gateway: String,
        domain: SyncDomain,
    ) -> Self {
        Self {
            context,
            namespace,
            gateway,
            domain,
        }
    }
}

#[async_trait]
impl Job for DomainJob {
    fn domain(&self) -> &'static str {
        self.domain.as_str()
    }

    async fn run(&self) -> Result<JobOutcome, SyncError> {
        let span = info_span!(
            "sync.domain",
            gateway = %self.gateway,
            namespace = %self.namespace,
            domain = self.domain.as_str(),
            operation.duration_ms = tracing::field::Empty,
            operation.success = tracing::field::Empty,
        );
        let start = std::time::Instant::now();

        let result = async {
            let Some(gateway) = self
                .context
                .cluster
                .get_gateway(&self.namespace, &self.gateway)
                .await?
            else {
                info!("Gateway no longer exists, deregistering job");
                return Ok(JobOutcome::Deregister);
            };
            if !self.domain.is_enabled(&gateway) {
                info!("Domain disabled, deregistering job");
                return Ok(JobOutcome::Deregister);
            }
            if gateway.spec.suspend {
                debug!("Gateway suspended, skipping");
                return Ok(JobOutcome::Continue);
            }

            let context = self.context.as_ref();
            match self.domain {
                SyncDomain::Repositories => repositories::sync(context, &gateway).await?,
                SyncDomain::ExternalSecrets
                | SyncDomain::ExternalKeys
                | SyncDomain::ExternalCerts => {
                    external::sync(context, &gateway, self.domain).await?;
                }
                SyncDomain::ClusterProperties => {
                    properties::sync_cluster_properties(context, &gateway).await?;
                }
                SyncDomain::ListenPorts => {
                    properties::sync_listen_ports(context, &gateway).await?;
                }
                SyncDomain::OtkMaintenance => {
                    otk::sync_maintenance(context, &gateway).await?;
                }
                SyncDomain::OtkPolicies => {
                    otk::sync_policies(context, &gateway).await?;
                }
                SyncDomain::OtkCertificates => {
                    otk::sync_certificates(context, &gateway).await?;
                }
                SyncDomain::ManagementPod => management::sync(context, &gateway).await?,
            }
            Ok(JobOutcome::Continue)
        }
        .instrument(span.clone())
        .await;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        span.record("operation.duration_ms", duration_ms);
        span.record("operation.success", result.is_ok());
        result
    }
}
