//! Management pod election.
//!
//! One ready pod per fleet carries the management label. The labelled pod keeps
//! the role while it stays ready; otherwise the first ready pod by name takes it.

use super::pipeline::{fleet_target, patch_status};
use super::SyncContext;
use crate::cluster::{MarkerPatch, PodInfo};
use crate::constants::{MANAGEMENT_POD_LABEL, MANAGEMENT_POD_LABEL_VALUE};
use crate::crd::{Gateway, GatewayPodStatus};
use crate::error::SyncError;
use serde_json::json;
use tracing::info;

pub(super) async fn sync(context: &SyncContext, gateway: &Gateway) -> Result<(), SyncError> {
    let target = fleet_target(&context.config, gateway);
    let mut pods = context
        .cluster
        .list_pods(&target.namespace, &target.selector)
        .await?;
    pods.sort_by(|a, b| a.name.cmp(&b.name));

    let elected = elect(&pods);

    for stale in stale_leaders(&pods, elected) {
        let patch = MarkerPatch::from([(MANAGEMENT_POD_LABEL.to_string(), None)]);
        context
            .cluster
            .patch_pod_labels(&target.namespace, stale, &patch)
            .await?;
        info!(gateway = %gateway.instance_key(), pod = %stale, "Removed management label");
    }
    if let Some(leader) = pods
        .iter()
        .find(|pod| Some(pod.name.as_str()) == elected && !is_leader(pod))
    {
        let patch = MarkerPatch::from([(
            MANAGEMENT_POD_LABEL.to_string(),
            Some(MANAGEMENT_POD_LABEL_VALUE.to_string()),
        )]);
        context
            .cluster
            .patch_pod_labels(&target.namespace, &leader.name, &patch)
            .await?;
        info!(gateway = %gateway.instance_key(), pod = %leader.name, "Elected management pod");
    }

    let gateways: Vec<GatewayPodStatus> = pods
        .iter()
        .map(|pod| GatewayPodStatus {
            name: pod.name.clone(),
            ready: pod.ready,
            ip: pod.ip.clone(),
        })
        .collect();
    let ready_pods = gateways.iter().filter(|pod| pod.ready).count();
    let ready = usize::try_from(gateway.spec.replicas).is_ok_and(|replicas| ready_pods >= replicas)
        && ready_pods > 0;

    let status = gateway.status.as_ref();
    let changed = status.is_none_or(|status| {
        status.management_pod.as_deref() != elected
            || status.gateways != gateways
            || status.ready != ready
    });
    if changed {
        patch_status(
            context,
            gateway,
            json!({
                "ready": ready,
                "managementPod": elected,
                "gateways": gateways,
            }),
        )
        .await;
    }
    Ok(())
}

fn is_leader(pod: &PodInfo) -> bool {
    pod.labels.get(MANAGEMENT_POD_LABEL).map(String::as_str) == Some(MANAGEMENT_POD_LABEL_VALUE)
}

/// Labelled pods other than the elected one
fn stale_leaders<'a>(pods: &'a [PodInfo], elected: Option<&str>) -> Vec<&'a str> {
    pods.iter()
        .filter(|pod| is_leader(pod) && Some(pod.name.as_str()) != elected)
        .map(|pod| pod.name.as_str())
        .collect()
}

/// Current leader while ready, else the first ready pod of the name-sorted list
fn elect(pods: &[PodInfo]) -> Option<&str> {
    pods.iter()
        .find(|pod| pod.ready && is_leader(pod))
        .or_else(|| pods.iter().find(|pod| pod.ready))
        .map(|pod| pod.name.as_str())
}
