//! Cluster-wide properties and listen ports.

use super::pipeline::{apply_desired, ApplyOutcome, Update};
use super::{SyncContext, SyncDomain};
use crate::bundle::DesiredState;
use crate::crd::Gateway;
use crate::delivery::gate::marker_key;
use crate::error::SyncError;

pub(super) async fn sync_cluster_properties(
    context: &SyncContext,
    gateway: &Gateway,
) -> Result<ApplyOutcome, SyncError> {
    let state = DesiredState::ClusterProperties(gateway.spec.cluster_properties.properties.clone());
    apply_desired(context, gateway, &state, update(SyncDomain::ClusterProperties, gateway)).await
}

pub(super) async fn sync_listen_ports(
    context: &SyncContext,
    gateway: &Gateway,
) -> Result<ApplyOutcome, SyncError> {
    let state = DesiredState::ListenPorts(gateway.spec.listen_ports.ports.clone());
    apply_desired(context, gateway, &state, update(SyncDomain::ListenPorts, gateway)).await
}

/// Single-bundle domains keep one status record and one marker per Gateway
pub(super) fn update(domain: SyncDomain, gateway: &Gateway) -> Update<'static> {
    Update {
        domain: domain.as_str(),
        status_key: domain.as_str(),
        marker_key: marker_key(domain.as_str(), gateway.gateway_name()),
        passphrase: None,
        notification: None,
    }
}
