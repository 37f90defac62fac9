//! Build, gate, deliver, record: the steps every domain job shares.

use super::SyncContext;
use crate::bundle::{build_delete, BuiltBundle, BundleKind, DesiredState};
use crate::cache::cache_key;
use crate::cluster::ClusterClient;
use crate::config::ControllerConfig;
use crate::constants::{MANAGEMENT_PASSWORD_KEY, MANAGEMENT_USERNAME_KEY};
use crate::crd::{AppliedState, EncryptionReference, EntityRef, Gateway};
use crate::delivery::{
    DeliveryReport, FleetTarget, GatewayUpdateRequest, ManagementCredentials, NotificationTarget,
    Strategy,
};
use crate::error::{is_conflict, SyncError};
use crate::observability::metrics;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// How a gateway fleet is reached
pub fn fleet_target(config: &ControllerConfig, gateway: &Gateway) -> FleetTarget {
    let name = gateway.gateway_name();
    let management = &gateway.spec.management;
    FleetTarget {
        namespace: gateway.gateway_namespace().to_string(),
        gateway: name.to_string(),
        selector: format!("{}={name}", config.gateway_label_key),
        service: management
            .service_name
            .clone()
            .unwrap_or_else(|| name.to_string()),
        port: management.port.unwrap_or(config.management_port),
        strategy: if management.database.enabled {
            Strategy::DbBacked
        } else {
            Strategy::Ephemeral
        },
    }
}

/// Management API credentials from the Gateway's management Secret
pub async fn load_credentials(
    cluster: &dyn ClusterClient,
    gateway: &Gateway,
) -> Result<ManagementCredentials, SyncError> {
    let secret_name = &gateway.spec.management.secret_name;
    let secret = cluster
        .get_secret(gateway.gateway_namespace(), secret_name)
        .await?
        .ok_or_else(|| {
            SyncError::configuration(format!("management secret {secret_name} not found"))
        })?;

    let username = secret.string(MANAGEMENT_USERNAME_KEY).ok_or_else(|| {
        SyncError::configuration(format!(
            "management secret {secret_name} has no {MANAGEMENT_USERNAME_KEY} key"
        ))
    })?;
    let password = secret.string(MANAGEMENT_PASSWORD_KEY).ok_or_else(|| {
        SyncError::configuration(format!(
            "management secret {secret_name} has no {MANAGEMENT_PASSWORD_KEY} key"
        ))
    })?;

    Ok(ManagementCredentials {
        username,
        password: Zeroizing::new(password),
    })
}

/// Bundle encryption passphrase, when the reference asks for one
pub(super) async fn load_passphrase(
    cluster: &dyn ClusterClient,
    namespace: &str,
    encryption: Option<&EncryptionReference>,
) -> Result<Option<Zeroizing<String>>, SyncError> {
    let Some(encryption) = encryption else {
        return Ok(None);
    };
    let secret = cluster
        .get_secret(namespace, &encryption.existing_secret)
        .await?
        .ok_or_else(|| {
            SyncError::configuration(format!(
                "encryption secret {} not found",
                encryption.existing_secret
            ))
        })?;
    let passphrase = secret.string(&encryption.key).ok_or_else(|| {
        SyncError::configuration(format!(
            "encryption secret {} has no {} key",
            encryption.existing_secret, encryption.key
        ))
    })?;
    Ok(Some(Zeroizing::new(passphrase)))
}

/// What one pass of the pipeline did
#[derive(Debug)]
pub(super) enum ApplyOutcome {
    /// The fleet was confirmed complete for this fingerprint within the cache lifetime
    Cached,
    /// Nothing desired and nothing to remove
    Empty,
    /// Another attempt is delivering the same fingerprint
    InFlight,
    Delivered(DeliveryReport),
}

/// Domain-specific inputs of one pipeline pass
pub(super) struct Update<'a> {
    pub domain: &'static str,
    /// Key under `status.lastApplied`
    pub status_key: &'a str,
    pub marker_key: String,
    pub passphrase: Option<Zeroizing<String>>,
    pub notification: Option<NotificationTarget>,
}

/// Entities last applied under `status_key`
pub(super) fn last_applied<'a>(gateway: &'a Gateway, status_key: &str) -> Option<&'a AppliedState> {
    gateway
        .status
        .as_ref()
        .and_then(|status| status.last_applied.get(status_key))
}

/// Build `state` against the last applied entities, deliver it, and record the result
pub(super) async fn apply_desired(
    context: &SyncContext,
    gateway: &Gateway,
    state: &DesiredState,
    update: Update<'_>,
) -> Result<ApplyOutcome, SyncError> {
    let previous = last_applied(gateway, update.status_key);
    let previous_entities = previous.map_or(&[][..], |applied| applied.entities.as_slice());
    let built = state.build(previous_entities)?;

    if built.empty && previous_entities.is_empty() {
        debug!(gateway = %gateway.instance_key(), domain = update.domain, "Nothing to deliver");
        return Ok(ApplyOutcome::Empty);
    }

    let cache_entry = cache_key(
        update.domain,
        &format!("{}:{}", gateway.instance_key(), update.status_key),
    );
    if context.cache.get(&cache_entry).await.as_deref() == Some(built.fingerprint.as_str()) {
        metrics::increment_cache_hits(update.domain);
        return Ok(ApplyOutcome::Cached);
    }

    let target = fleet_target(&context.config, gateway);
    let credentials = load_credentials(context.cluster.as_ref(), gateway).await?;
    let fingerprint = built.fingerprint.clone();
    let claim = format!("{cache_entry}@{fingerprint}");
    if !context.cache.try_claim(claim.clone(), fingerprint.clone()).await {
        debug!(gateway = %gateway.instance_key(), domain = update.domain, "Delivery already in flight");
        return Ok(ApplyOutcome::InFlight);
    }
    let desired_entities = built.entities.clone();
    let request = GatewayUpdateRequest::new(built, update.marker_key, credentials)
        .with_passphrase(update.passphrase)
        .with_notification(update.notification);

    let delivered = context.delivery.deliver(&target, &request).await;
    context.cache.remove(&claim).await;
    let report = delivered?;
    if report.deferred.is_some() {
        return Ok(ApplyOutcome::Delivered(report));
    }
    debug!(
        gateway = %gateway.instance_key(),
        domain = update.domain,
        succeeded = report.succeeded().len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Domain delivery finished"
    );

    let complete = report.fleet_complete();
    // Entities only shrink once every ready target has the tombstones
    let entities = if complete {
        desired_entities
    } else {
        union(previous_entities, &desired_entities)
    };
    let unchanged = previous
        .is_some_and(|applied| applied.fingerprint == fingerprint && applied.entities == entities);
    if !unchanged && (complete || !report.succeeded().is_empty()) {
        let applied = AppliedState {
            fingerprint: fingerprint.clone(),
            entities,
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        patch_status(
            context,
            gateway,
            json!({ "lastApplied": { (update.status_key): applied } }),
        )
        .await;
    }
    if complete {
        context.cache.insert(cache_entry, fingerprint).await;
    }
    Ok(ApplyOutcome::Delivered(report))
}

/// Remove entities applied under `status_key` and clear the marker.
///
/// The last-applied record is dropped once no ready target carries the marker.
pub(super) async fn apply_delete(
    context: &SyncContext,
    gateway: &Gateway,
    kind: BundleKind,
    update: Update<'_>,
) -> Result<ApplyOutcome, SyncError> {
    let Some(previous) = last_applied(gateway, update.status_key) else {
        return Ok(ApplyOutcome::Empty);
    };
    let built: BuiltBundle = build_delete(kind, &previous.entities);
    if built.empty {
        clear_last_applied(context, gateway, update.status_key).await;
        return Ok(ApplyOutcome::Empty);
    }

    let target = fleet_target(&context.config, gateway);
    let credentials = load_credentials(context.cluster.as_ref(), gateway).await?;
    let request = GatewayUpdateRequest::new(built, update.marker_key, credentials)
        .with_delete(true)
        .with_passphrase(update.passphrase)
        .with_notification(update.notification);

    let report = context.delivery.deliver(&target, &request).await?;
    if report.fleet_complete() {
        clear_last_applied(context, gateway, update.status_key).await;
        context
            .cache
            .remove(&cache_key(
                update.domain,
                &format!("{}:{}", gateway.instance_key(), update.status_key),
            ))
            .await;
    }
    Ok(ApplyOutcome::Delivered(report))
}

async fn clear_last_applied(context: &SyncContext, gateway: &Gateway, status_key: &str) {
    patch_status(
        context,
        gateway,
        json!({ "lastApplied": { (status_key): serde_json::Value::Null } }),
    )
    .await;
}

/// Merge-patch the Gateway status. Failures are logged, never fatal for the attempt.
pub(super) async fn patch_status(context: &SyncContext, gateway: &Gateway, status: serde_json::Value) {
    let result = context
        .cluster
        .patch_gateway_status(gateway.gateway_namespace(), gateway.gateway_name(), status)
        .await;
    match result {
        Ok(()) => {}
        Err(SyncError::Kube(e)) if is_conflict(&e) => {
            warn!(gateway = %gateway.instance_key(), "Gateway status update conflicted, retrying next tick");
        }
        Err(e) => {
            warn!(gateway = %gateway.instance_key(), error = %e, "Failed to update Gateway status");
        }
    }
}

fn union(previous: &[EntityRef], current: &[EntityRef]) -> Vec<EntityRef> {
    previous
        .iter()
        .chain(current)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
