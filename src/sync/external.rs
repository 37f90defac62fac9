//! External Secrets, keys and certificates.

use super::pipeline::{apply_desired, ApplyOutcome};
use super::properties::update;
use super::{SyncContext, SyncDomain};
use crate::bundle::builders::ExternalSource;
use crate::bundle::DesiredState;
use crate::crd::{ExternalReference, Gateway};
use crate::error::SyncError;
use futures::future::try_join_all;

pub(super) async fn sync(
    context: &SyncContext,
    gateway: &Gateway,
    domain: SyncDomain,
) -> Result<ApplyOutcome, SyncError> {
    let references = match domain {
        SyncDomain::ExternalSecrets => &gateway.spec.external_secrets,
        SyncDomain::ExternalKeys => &gateway.spec.external_keys,
        _ => &gateway.spec.external_certs,
    };
    let sources = load_sources(context, gateway.gateway_namespace(), references).await?;
    let state = match domain {
        SyncDomain::ExternalSecrets => DesiredState::ExternalSecrets(sources),
        SyncDomain::ExternalKeys => DesiredState::ExternalKeys(sources),
        _ => DesiredState::ExternalCerts(sources),
    };
    apply_desired(context, gateway, &state, update(domain, gateway)).await
}

/// Fetch the Secret behind every enabled reference. A missing Secret is a configuration error.
async fn load_sources(
    context: &SyncContext,
    namespace: &str,
    references: &[ExternalReference],
) -> Result<Vec<ExternalSource>, SyncError> {
    let fetches = references
        .iter()
        .filter(|reference| reference.enabled)
        .map(|reference| async move {
            let secret = context
                .cluster
                .get_secret(namespace, &reference.name)
                .await?
                .ok_or_else(|| {
                    SyncError::configuration(format!("secret {} not found", reference.name))
                })?;
            Ok::<_, SyncError>(ExternalSource {
                reference: reference.clone(),
                secret,
            })
        });
    try_join_all(fetches).await
}
