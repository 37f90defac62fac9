//! Repository references of a Gateway.
//!
//! Each enabled reference is resolved, loaded from its directories and delivered
//! under its own marker. Resolution also publishes the compressed snapshot, the
//! state-store snapshot and the Repository status, once per fingerprint.
//! A reference that is disabled or removed while its entities are still applied
//! is delivered once more as a delete bundle.

use super::pipeline::{
    apply_delete, apply_desired, last_applied, load_passphrase, patch_status, Update,
};
use super::{SyncContext, SyncDomain};
use crate::bundle::{BundleKind, DesiredState, RepositoryPayload};
use crate::cache::cache_key;
use crate::crd::{
    Gateway, Repository, RepositoryReference, RepositoryReferenceStatus, RepositoryType,
};
use crate::delivery::gate::marker_key;
use crate::delivery::NotificationTarget;
use crate::error::SyncError;
use crate::repository::snapshot::{publish_snapshot, SnapshotOutcome};
use crate::repository::ResolvedRepository;
use crate::statestore::write_snapshot;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Prefix of repository keys under `status.lastApplied`
pub(super) const STATUS_KEY_PREFIX: &str = "repository-";

const DOMAIN: &str = "repositories";

fn status_key(reference: &str) -> String {
    format!("{STATUS_KEY_PREFIX}{reference}")
}

fn update<'a>(status_key: &'a str, reference: &str) -> Update<'a> {
    Update {
        domain: SyncDomain::Repositories.as_str(),
        status_key,
        marker_key: marker_key(BundleKind::Repository.as_str(), reference),
        passphrase: None,
        notification: None,
    }
}

pub(super) async fn sync(context: &SyncContext, gateway: &Gateway) -> Result<(), SyncError> {
    let mut statuses = Vec::new();
    let mut first_error = None;

    for reference in &gateway.spec.repository_references {
        let result = if reference.enabled {
            sync_reference(context, gateway, reference).await
        } else {
            remove_reference(context, gateway, &reference.name)
                .await
                .map(|()| disabled_status(gateway, &reference.name))
        };
        match result {
            Ok(status) => statuses.push(status),
            Err(e) => {
                warn!(
                    gateway = %gateway.instance_key(),
                    repository = %reference.name,
                    error = %e,
                    "Repository reference sync failed"
                );
                if let Some(previous) = previous_status(gateway, &reference.name) {
                    statuses.push(previous.clone());
                }
                first_error.get_or_insert(e);
            }
        }
    }

    let referenced: BTreeSet<&str> = gateway
        .spec
        .repository_references
        .iter()
        .map(|reference| reference.name.as_str())
        .collect();
    let removed: Vec<String> = gateway
        .status
        .iter()
        .flat_map(|status| status.last_applied.keys())
        .filter_map(|key| key.strip_prefix(STATUS_KEY_PREFIX))
        .filter(|name| !referenced.contains(name))
        .map(str::to_string)
        .collect();
    for name in removed {
        if let Err(e) = remove_reference(context, gateway, &name).await {
            warn!(gateway = %gateway.instance_key(), repository = %name, error = %e, "Failed to remove repository bundle");
            first_error.get_or_insert(e);
        }
    }

    let current = gateway
        .status
        .as_ref()
        .map(|status| &status.repository_status);
    if current != Some(&statuses) {
        patch_status(context, gateway, json!({ "repositoryStatus": statuses }))
            .await;
    }

    first_error.map_or(Ok(()), Err)
}

async fn sync_reference(
    context: &SyncContext,
    gateway: &Gateway,
    reference: &RepositoryReference,
) -> Result<RepositoryReferenceStatus, SyncError> {
    let namespace = gateway.gateway_namespace();
    let repository = context
        .cluster
        .get_repository(namespace, &reference.name)
        .await?
        .ok_or_else(|| {
            SyncError::configuration(format!("repository {} not found", reference.name))
        })?;
    if !repository.spec.enabled {
        remove_reference(context, gateway, &reference.name).await?;
        return Ok(disabled_status(gateway, &reference.name));
    }

    // Held until the shared checkout has been read
    let checkout = context.checkout_locks.lock(&repository).await;
    let resolved = match context.resolver.resolve(&repository).await {
        Ok(resolved) => resolved,
        Err(e) => {
            report_failure(context, &repository, &e).await;
            return Err(e);
        }
    };
    let payload = load_payload(&resolved, &reference.directories, &repository).await?;
    let storage_secret_name =
        publish(context, &repository, &resolved, &reference.directories, &payload).await;
    drop(checkout);

    let passphrase =
        load_passphrase(context.cluster.as_ref(), namespace, reference.encryption.as_ref()).await?;
    let notification = reference
        .notification
        .clone()
        .map(|config| NotificationTarget {
            config,
            repository: reference.name.clone(),
            commit: resolved.fingerprint.clone(),
        });

    let key = status_key(&reference.name);
    let reference_update = Update {
        passphrase,
        notification,
        ..update(&key, &reference.name)
    };
    apply_desired(
        context,
        gateway,
        &DesiredState::Repository(payload),
        reference_update,
    )
    .await?;

    let last_sync = previous_status(gateway, &reference.name)
        .filter(|previous| previous.commit.as_deref() == Some(resolved.fingerprint.as_str()))
        .and_then(|previous| previous.last_sync.clone())
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
    Ok(RepositoryReferenceStatus {
        name: reference.name.clone(),
        enabled: true,
        r#type: Some(repository.spec.r#type.as_str().to_string()),
        commit: Some(resolved.fingerprint),
        storage_secret_name,
        last_sync: Some(last_sync),
    })
}

/// Walk the materialized tree off the async runtime
async fn load_payload(
    resolved: &ResolvedRepository,
    directories: &[String],
    repository: &Repository,
) -> Result<RepositoryPayload, SyncError> {
    let resolved = resolved.clone();
    let directories = directories.to_vec();
    let format = repository.spec.format;
    tokio::task::spawn_blocking(move || resolved.load(&directories, format))
        .await
        .map_err(|e| SyncError::transient(format!("bundle loading task failed: {e}")))?
}

/// Deliver the delete bundle for a reference whose entities are still applied
async fn remove_reference(
    context: &SyncContext,
    gateway: &Gateway,
    reference: &str,
) -> Result<(), SyncError> {
    let key = status_key(reference);
    if last_applied(gateway, &key).is_none() {
        return Ok(());
    }
    info!(gateway = %gateway.instance_key(), repository = %reference, "Removing repository bundle");
    apply_delete(context, gateway, BundleKind::Repository, update(&key, reference)).await?;
    Ok(())
}

/// Snapshot Secret, state-store snapshot and Repository status, once per fingerprint.
///
/// These belong to the Repository, not to one Gateway, so they always carry the
/// whole tree. `selected` is reused when the reference did not narrow it.
/// Returns the snapshot Secret name. Failures here never block delivery.
async fn publish(
    context: &SyncContext,
    repository: &Repository,
    resolved: &ResolvedRepository,
    directories: &[String],
    selected: &RepositoryPayload,
) -> Option<String> {
    let namespace = repository.repository_namespace();
    let name = repository.repository_name();
    let entry = cache_key(
        DOMAIN,
        &format!("{namespace}/{name}:{}", resolved.fingerprint),
    );
    if let Some(secret_name) = context.cache.get(&entry).await {
        crate::observability::metrics::increment_cache_hits(DOMAIN);
        return Some(secret_name).filter(|secret_name| !secret_name.is_empty());
    }

    let whole_tree;
    let payload = if directories.is_empty() {
        selected
    } else {
        match load_payload(resolved, &[], repository).await {
            Ok(loaded) => {
                whole_tree = loaded;
                &whole_tree
            }
            Err(e) => {
                warn!(repository = %name, error = %e, "Failed to load repository tree for publishing");
                return None;
            }
        }
    };

    let mut complete = true;
    let (storage_secret_name, mut message) = match publish_snapshot(
        context.cluster.as_ref(),
        namespace,
        name,
        payload,
        context.config.snapshot_size_limit,
    )
    .await
    {
        Ok(SnapshotOutcome::Skipped { size, limit }) => (
            None,
            Some(format!("snapshot of {size} bytes exceeds limit of {limit} bytes, not stored")),
        ),
        Ok(outcome) => (outcome.secret_name().map(str::to_string), None),
        Err(e) => {
            complete = false;
            warn!(repository = %name, error = %e, "Failed to store repository snapshot");
            (None, Some(format!("snapshot not stored: {e}")))
        }
    };

    let state_store_synced = match write_state_store(context, repository, payload).await {
        Ok(synced) => synced,
        Err(e) => {
            complete = false;
            warn!(repository = %name, error = %e, "Failed to write state store snapshot");
            message.get_or_insert_with(|| format!("state store not synced: {e}"));
            false
        }
    };

    let status = json!({
        "ready": true,
        "commit": resolved.fingerprint,
        "storageSecretName": storage_secret_name,
        "lastUpdated": chrono::Utc::now().to_rfc3339(),
        "stateStoreSynced": state_store_synced,
        "message": message,
    });
    if let Err(e) = context
        .cluster
        .patch_repository_status(namespace, name, status)
        .await
    {
        complete = false;
        warn!(repository = %name, error = %e, "Failed to update Repository status");
    }

    if complete {
        context
            .cache
            .insert(entry, storage_secret_name.clone().unwrap_or_default())
            .await;
    }
    storage_secret_name
}

/// Write the graphman snapshot to the referenced state store. Returns whether one was written.
async fn write_state_store(
    context: &SyncContext,
    repository: &Repository,
    payload: &RepositoryPayload,
) -> Result<bool, SyncError> {
    let Some(store_name) = repository.spec.state_store_reference.as_deref() else {
        return Ok(false);
    };
    // A statestore repository reads from the store it references
    if repository.spec.r#type == RepositoryType::StateStore {
        return Ok(false);
    }
    let RepositoryPayload::Graphman(bundle) = payload else {
        return Ok(false);
    };
    let (store, client) = context
        .state_stores
        .open(repository.repository_namespace(), store_name)
        .await?;
    let write = write_snapshot(
        client.as_ref(),
        &store.spec,
        &repository.storage_secret_name(),
        bundle,
    )
    .await?;
    info!(repository = %repository.repository_name(), store = %store_name, ?write, "State store snapshot written");
    Ok(true)
}

async fn report_failure(context: &SyncContext, repository: &Repository, error: &SyncError) {
    let status = json!({
        "ready": false,
        "message": error.to_string(),
    });
    if let Err(e) = context
        .cluster
        .patch_repository_status(
            repository.repository_namespace(),
            repository.repository_name(),
            status,
        )
        .await
    {
        warn!(repository = %repository.repository_name(), error = %e, "Failed to update Repository status");
    }
}

fn previous_status<'a>(gateway: &'a Gateway, name: &str) -> Option<&'a RepositoryReferenceStatus> {
    gateway
        .status
        .as_ref()?
        .repository_status
        .iter()
        .find(|status| status.name == name)
}

fn disabled_status(gateway: &Gateway, name: &str) -> RepositoryReferenceStatus {
    let previous = previous_status(gateway, name);
    RepositoryReferenceStatus {
        name: name.to_string(),
        enabled: false,
        r#type: previous.and_then(|status| status.r#type.clone()),
        commit: None,
        storage_secret_name: None,
        last_sync: previous.and_then(|status| status.last_sync.clone()),
    }
}
