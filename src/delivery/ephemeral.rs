//! Ephemeral fleets: one delivery and one label marker per ready pod.

use super::gate::{should_apply, should_delete};
use super::{DeliveryReport, DeliveryState, FleetDelivery, FleetTarget, GatewayUpdateRequest, Strategy};
use crate::cluster::{MarkerPatch, PodInfo};
use crate::error::SyncError;
use crate::observability::metrics;
use futures::future::join_all;
use std::time::Instant;
use tracing::{debug, warn};

impl FleetDelivery {
    pub(super) async fn deliver_ephemeral(
        &self,
        target: &FleetTarget,
        request: &GatewayUpdateRequest,
    ) -> Result<DeliveryReport, SyncError> {
        let strategy = Strategy::Ephemeral;
        let pods = self
            .cluster
            .list_pods(&target.namespace, &target.selector)
            .await?;
        let ready: Vec<PodInfo> = pods.into_iter().filter(|pod| pod.ready).collect();

        let mut report = DeliveryReport::new(strategy);
        report.ready_targets = ready.len();
        if ready.is_empty() {
            report.deferred = Some("no ready pods".to_string());
            return Ok(report);
        }

        let mut pending = Vec::new();
        for pod in ready {
            let needed = if request.delete {
                should_delete(&pod.labels, &request.marker_key)
            } else {
                should_apply(&pod.labels, &request.marker_key, &request.fingerprint)
            };
            if needed {
                pending.push(pod);
            } else {
                metrics::increment_deliveries_skipped(strategy.as_str());
                report.skipped.push(pod.name);
            }
        }

        for pod in &pending {
            report
                .states
                .insert(pod.name.clone(), DeliveryState::Delivering);
        }
        let results = join_all(
            pending
                .iter()
                .map(|pod| self.deliver_to_pod(target, request, pod)),
        )
        .await;

        for (pod, result) in pending.iter().zip(results) {
            match result {
                Ok(()) => {
                    report.states.insert(pod.name.clone(), DeliveryState::Marked);
                }
                Err(e) => {
                    warn!(pod = %pod.name, error = %e, "Delivery to pod failed, will retry on next tick");
                    report.states.insert(pod.name.clone(), DeliveryState::Pending);
                    report.failed.insert(pod.name.clone(), e.to_string());
                }
            }
        }
        Ok(report)
    }

    async fn deliver_to_pod(
        &self,
        target: &FleetTarget,
        request: &GatewayUpdateRequest,
        pod: &PodInfo,
    ) -> Result<(), SyncError> {
        let strategy = Strategy::Ephemeral.as_str();
        let ip = pod
            .ip
            .as_deref()
            .ok_or_else(|| SyncError::transient(format!("pod {} has no IP yet", pod.name)))?;

        debug!(pod = %pod.name, "Delivering bundle");
        let start = Instant::now();
        let delivered = self.gateway.apply(&target.pod_url(ip), request).await;
        metrics::observe_delivery_duration(strategy, start.elapsed().as_secs_f64());
        metrics::increment_deliveries(strategy, delivered.is_ok());
        delivered?;

        let mut labels = MarkerPatch::new();
        let value = (!request.delete).then(|| request.fingerprint.clone());
        labels.insert(request.marker_key.clone(), value);
        self.cluster
            .patch_pod_labels(&target.namespace, &pod.name, &labels)
            .await?;
        debug!(pod = %pod.name, "Marker recorded");
        Ok(())
    }
}
