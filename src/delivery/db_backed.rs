//! DB-backed fleets: one delivery through the Service and a Deployment annotation marker.

use super::gate::{should_apply, should_delete};
use super::{DeliveryReport, DeliveryState, FleetDelivery, FleetTarget, GatewayUpdateRequest, Strategy};
use crate::cluster::MarkerPatch;
use crate::error::SyncError;
use crate::observability::metrics;
use std::time::Instant;
use tracing::warn;

impl FleetDelivery {
    pub(super) async fn deliver_db_backed(
        &self,
        target: &FleetTarget,
        request: &GatewayUpdateRequest,
    ) -> Result<DeliveryReport, SyncError> {
        let strategy = Strategy::DbBacked;
        let Some(deployment) = self
            .cluster
            .get_deployment(&target.namespace, &target.gateway)
            .await?
        else {
            return Ok(DeliveryReport::deferred(strategy, "deployment not found"));
        };

        if !deployment.is_available() {
            return Ok(DeliveryReport::deferred(
                strategy,
                format!(
                    "deployment not available ({}/{} ready)",
                    deployment.ready_replicas, deployment.replicas
                ),
            ));
        }

        let mut report = DeliveryReport::new(strategy);
        report.ready_targets = 1;
        let needed = if request.delete {
            should_delete(&deployment.annotations, &request.marker_key)
        } else {
            should_apply(
                &deployment.annotations,
                &request.marker_key,
                &request.fingerprint,
            )
        };
        if !needed {
            metrics::increment_deliveries_skipped(strategy.as_str());
            report.skipped.push(deployment.name);
            return Ok(report);
        }

        report
            .states
            .insert(deployment.name.clone(), DeliveryState::Delivering);
        match self.deliver_once(target, request, &deployment.name).await {
            Ok(()) => {
                report
                    .states
                    .insert(deployment.name, DeliveryState::Marked);
            }
            Err(e) => {
                warn!(deployment = %deployment.name, error = %e, "Delivery failed, will retry on next tick");
                report
                    .states
                    .insert(deployment.name.clone(), DeliveryState::Pending);
                report.failed.insert(deployment.name, e.to_string());
            }
        }
        Ok(report)
    }

    async fn deliver_once(
        &self,
        target: &FleetTarget,
        request: &GatewayUpdateRequest,
        deployment: &str,
    ) -> Result<(), SyncError> {
        let strategy = Strategy::DbBacked.as_str();
        let start = Instant::now();
        let delivered = self.gateway.apply(&target.service_url(), request).await;
        metrics::observe_delivery_duration(strategy, start.elapsed().as_secs_f64());
        metrics::increment_deliveries(strategy, delivered.is_ok());
        delivered?;

        let mut annotations = MarkerPatch::new();
        let value = (!request.delete).then(|| request.fingerprint.clone());
        annotations.insert(request.marker_key.clone(), value);
        self.cluster
            .patch_deployment_annotations(&target.namespace, deployment, &annotations)
            .await
    }
}
