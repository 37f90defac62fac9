//! # Fleet Delivery
//!
//! Pushes gateway update requests into a gateway fleet.
//!
//! - **Ephemeral** fleets: every ready pod is configured on its own and carries
//!   its own label marker.
//! - **DB-backed** fleets: pods share a database, so one delivery through the
//!   Service is enough and the marker is an annotation on the Deployment.
//!
//! Each target moves `Pending -> Delivering -> Marked`. A failed target returns
//! to `Pending` and is retried on the next scheduler tick, never in-loop.

mod client;
mod db_backed;
mod ephemeral;
pub mod gate;
mod notify;
mod request;

pub use client::{GatewayClient, HttpGatewayClient};
pub use notify::{Notification, Notifier, WebhookNotifier};
pub use request::{GatewayUpdateRequest, ManagementCredentials, NotificationTarget};

use crate::cluster::ClusterClient;
use crate::observability::metrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Delivery strategy of a gateway fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Ephemeral,
    DbBacked,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Ephemeral => "ephemeral",
            Strategy::DbBacked => "db-backed",
        }
    }
}

/// Delivery state of a single target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Delivering,
    Marked,
}

/// Where a fleet lives and how to reach it
#[derive(Debug, Clone)]
pub struct FleetTarget {
    pub namespace: String,
    /// Gateway name, also the Deployment name
    pub gateway: String,
    /// Label selector for the gateway's pods (`key=value`)
    pub selector: String,
    /// Service used for DB-backed delivery
    pub service: String,
    pub port: u16,
    pub strategy: Strategy,
}

impl FleetTarget {
    /// `https://<gateway>.<namespace>.svc.cluster.local:<port>`
    pub fn service_url(&self) -> String {
        format!(
            "https://{}.{}.svc.cluster.local:{}",
            self.service, self.namespace, self.port
        )
    }

    /// `https://<podIP>:<port>`
    pub fn pod_url(&self, ip: &str) -> String {
        format!("https://{ip}:{}", self.port)
    }
}

/// Outcome of one delivery cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub strategy: Strategy,
    /// Final state per target (pod name, or Deployment name for DB-backed)
    pub states: BTreeMap<String, DeliveryState>,
    /// Targets whose marker already matched
    pub skipped: Vec<String>,
    /// Targets that failed with the reason
    pub failed: BTreeMap<String, String>,
    /// Ready targets seen; for DB-backed fleets, 1 when the Deployment is available
    pub ready_targets: usize,
    /// Delivery was not attempted at all, with the reason
    pub deferred: Option<String>,
}

impl DeliveryReport {
    pub(crate) fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            states: BTreeMap::new(),
            skipped: Vec::new(),
            failed: BTreeMap::new(),
            ready_targets: 0,
            deferred: None,
        }
    }

    pub(crate) fn deferred(strategy: Strategy, reason: impl Into<String>) -> Self {
        Self {
            deferred: Some(reason.into()),
            ..Self::new(strategy)
        }
    }

    /// Targets that delivered and recorded the marker in this cycle
    pub fn succeeded(&self) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, state)| **state == DeliveryState::Marked)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of deliveries attempted in this cycle
    pub fn attempted(&self) -> usize {
        self.states.len()
    }

    /// Every ready target now carries the marker
    pub fn fleet_complete(&self) -> bool {
        self.deferred.is_none()
            && self.failed.is_empty()
            && self.ready_targets > 0
            && self.succeeded().len() + self.skipped.len() == self.ready_targets
    }
}

/// Delivers update requests to gateway fleets
#[derive(Clone)]
pub struct FleetDelivery {
    cluster: Arc<dyn ClusterClient>,
    gateway: Arc<dyn GatewayClient>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for FleetDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetDelivery").finish_non_exhaustive()
    }
}

impl FleetDelivery {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        gateway: Arc<dyn GatewayClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            cluster,
            gateway,
            notifier,
        }
    }

    /// Run one delivery cycle with the target's strategy, then notify if requested
    pub async fn deliver(
        &self,
        target: &FleetTarget,
        request: &GatewayUpdateRequest,
    ) -> Result<DeliveryReport, crate::error::SyncError> {
        let report = match target.strategy {
            Strategy::Ephemeral => self.deliver_ephemeral(target, request).await?,
            Strategy::DbBacked => self.deliver_db_backed(target, request).await?,
        };

        if let Some(reason) = &report.deferred {
            info!(gateway = %target.gateway, kind = %request.kind, reason = %reason, "Delivery deferred");
        } else if report.attempted() > 0 {
            info!(
                gateway = %target.gateway,
                kind = %request.kind,
                strategy = target.strategy.as_str(),
                succeeded = report.succeeded().len(),
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                "Delivery cycle finished"
            );
            self.notify(target, request, &report).await;
        }
        Ok(report)
    }

    /// Fires at most once per cycle, listing only confirmed targets
    async fn notify(
        &self,
        target: &FleetTarget,
        request: &GatewayUpdateRequest,
        report: &DeliveryReport,
    ) {
        let Some(notification) = request
            .notification
            .as_ref()
            .filter(|notification| notification.config.enabled)
        else {
            return;
        };

        let succeeded = report.succeeded();
        let body = Notification {
            repository: notification.repository.clone(),
            commit: notification.commit.clone(),
            deployment: target.gateway.clone(),
            text: format!(
                "{} {} applied to {}/{} targets of {}",
                request.kind,
                if request.delete { "delete" } else { "bundle" },
                succeeded.len(),
                report.attempted(),
                target.gateway
            ),
            pods: succeeded.into_iter().map(|pod| (pod, true)).collect(),
        };
        match self.notifier.notify(&notification.config, &body).await {
            Ok(()) => metrics::increment_notifications(true),
            Err(e) => {
                metrics::increment_notifications(false);
                warn!(gateway = %target.gateway, error = %e, "Failed to send delivery notification");
            }
        }
    }
}
