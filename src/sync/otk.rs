//! OAuth toolkit maintenance tasks, policy overrides and certificate exchange.
//!
//! Paired DMZ and internal gateways never call each other. Each publishes its
//! own TLS certificate to a Secret carrying a checksum annotation and reads
//! the Secret its peer published.

use super::pipeline::{apply_desired, ApplyOutcome};
use super::properties::update;
use super::{SyncContext, SyncDomain};
use crate::bundle::builders::{OtkPeer, PeerCertificate};
use crate::bundle::{sha224_hex, DesiredState};
use crate::cluster::SecretData;
use crate::constants::CHECKSUM_ANNOTATION;
use crate::crd::{Gateway, OtkConfig, OtkType};
use crate::error::SyncError;
use std::collections::BTreeMap;
use tracing::{debug, info};

const CERTIFICATE_KEY: &str = "tls.crt";

pub(super) async fn sync_maintenance(
    context: &SyncContext,
    gateway: &Gateway,
) -> Result<ApplyOutcome, SyncError> {
    let Some(otk) = gateway.otk() else {
        return Ok(ApplyOutcome::Empty);
    };
    let state = DesiredState::OtkDatabaseMaintenance(otk.database.clone());
    apply_desired(context, gateway, &state, update(SyncDomain::OtkMaintenance, gateway)).await
}

pub(super) async fn sync_policies(
    context: &SyncContext,
    gateway: &Gateway,
) -> Result<ApplyOutcome, SyncError> {
    let Some(otk) = gateway.otk() else {
        return Ok(ApplyOutcome::Empty);
    };
    let peer = peer_reference(otk).map(|(name, _, port)| OtkPeer {
        host: format!("{name}.{}.svc.cluster.local", gateway.gateway_namespace()),
        port: port.unwrap_or(context.config.management_port),
    });
    let state = DesiredState::OtkPolicies {
        role: otk.r#type,
        peer,
    };
    apply_desired(context, gateway, &state, update(SyncDomain::OtkPolicies, gateway)).await
}

pub(super) async fn sync_certificates(
    context: &SyncContext,
    gateway: &Gateway,
) -> Result<ApplyOutcome, SyncError> {
    let Some(otk) = gateway.otk() else {
        return Ok(ApplyOutcome::Empty);
    };
    publish_own_certificate(context, gateway, otk).await?;

    let Some((peer, peer_role, _)) = peer_reference(otk) else {
        return Err(SyncError::configuration(format!(
            "OTK {} gateway has no paired gateway reference",
            otk.r#type.as_str()
        )));
    };
    let secret_name = certificate_secret_name(peer, peer_role);
    let published = context
        .cluster
        .get_secret(gateway.gateway_namespace(), &secret_name)
        .await?
        .filter(|secret| secret.annotations.contains_key(CHECKSUM_ANNOTATION));
    let Some(pem) = published.and_then(|secret| secret.string(CERTIFICATE_KEY)) else {
        debug!(secret = %secret_name, "Paired gateway has not published its certificate yet");
        return Ok(ApplyOutcome::Empty);
    };

    let state = DesiredState::OtkCertificates(vec![PeerCertificate {
        role: peer_role,
        gateway: peer.to_string(),
        pem,
    }]);
    apply_desired(context, gateway, &state, update(SyncDomain::OtkCertificates, gateway)).await
}

/// `<gateway>-otk-<role>-certificates`
pub fn certificate_secret_name(gateway: &str, role: OtkType) -> String {
    format!("{gateway}-otk-{}-certificates", role.as_str())
}

/// Paired gateway name, its role and its configured port
fn peer_reference(otk: &OtkConfig) -> Option<(&str, OtkType, Option<u16>)> {
    match otk.r#type {
        OtkType::Single => None,
        OtkType::Dmz => otk
            .internal_gateway_reference
            .as_deref()
            .map(|name| (name, OtkType::Internal, otk.internal_gateway_port)),
        OtkType::Internal => otk
            .dmz_gateway_reference
            .as_deref()
            .map(|name| (name, OtkType::Dmz, otk.dmz_gateway_port)),
    }
}

/// Copy this gateway's certificate into its published Secret when the checksum changed
async fn publish_own_certificate(
    context: &SyncContext,
    gateway: &Gateway,
    otk: &OtkConfig,
) -> Result<(), SyncError> {
    let Some(tls_secret_name) = otk.tls_secret_name.as_deref() else {
        return Ok(());
    };
    let namespace = gateway.gateway_namespace();
    let source = context
        .cluster
        .get_secret(namespace, tls_secret_name)
        .await?
        .ok_or_else(|| {
            SyncError::configuration(format!("OTK TLS secret {tls_secret_name} not found"))
        })?;
    let certificate = source.data.get(CERTIFICATE_KEY).ok_or_else(|| {
        SyncError::configuration(format!(
            "OTK TLS secret {tls_secret_name} has no {CERTIFICATE_KEY} key"
        ))
    })?;

    let checksum = sha224_hex(certificate);
    let published_name = certificate_secret_name(gateway.gateway_name(), otk.r#type);
    let current = context.cluster.get_secret(namespace, &published_name).await?;
    if current.is_some_and(|secret| secret.annotations.get(CHECKSUM_ANNOTATION) == Some(&checksum)) {
        return Ok(());
    }

    let secret = SecretData {
        annotations: BTreeMap::from([(CHECKSUM_ANNOTATION.to_string(), checksum)]),
        ..SecretData::opaque(BTreeMap::from([(
            CERTIFICATE_KEY.to_string(),
            certificate.clone(),
        )]))
    };
    context
        .cluster
        .apply_secret(namespace, &published_name, &secret)
        .await?;
    info!(secret = %published_name, "Published OTK certificate");
    Ok(())
}
