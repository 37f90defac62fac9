//! Compressed repository snapshots stored in a Secret.
//!
//! Gateways can bootstrap from the snapshot without reaching the repository.
//! Snapshots above the configured ceiling are not stored; Kubernetes caps a
//! Secret at 1MiB.

use crate::bundle::RepositoryPayload;
use crate::cluster::{ClusterClient, SecretData};
use crate::constants::CHECKSUM_ANNOTATION;
use crate::error::SyncError;
use crate::observability::metrics;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use tracing::{debug, info, warn};

pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>, SyncError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, SyncError> {
    let mut decoded = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut decoded)?;
    Ok(decoded)
}

/// Result of publishing a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Stored { secret_name: String, size: usize },
    /// Already stored with the same checksum
    Unchanged { secret_name: String },
    /// Over the size ceiling
    Skipped { size: usize, limit: usize },
}

impl SnapshotOutcome {
    /// Name of the Secret holding the snapshot, when there is one
    pub fn secret_name(&self) -> Option<&str> {
        match self {
            SnapshotOutcome::Stored { secret_name, .. }
            | SnapshotOutcome::Unchanged { secret_name } => Some(secret_name),
            SnapshotOutcome::Skipped { .. } => None,
        }
    }
}

/// Compressed serialized form of a payload
pub fn snapshot_bytes(payload: &RepositoryPayload) -> Result<Vec<u8>, SyncError> {
    let raw = match payload {
        RepositoryPayload::Graphman(bundle) => serde_json::to_vec(&bundle.to_json())?,
        RepositoryPayload::Restman(documents) => serde_json::to_vec(documents)?,
    };
    gzip(&raw)
}

/// Write the snapshot Secret `<repository>-repository` with key `<repository>.gz`
pub async fn publish_snapshot(
    cluster: &dyn ClusterClient,
    namespace: &str,
    repository: &str,
    payload: &RepositoryPayload,
    size_limit: usize,
) -> Result<SnapshotOutcome, SyncError> {
    let compressed = snapshot_bytes(payload)?;
    let size = compressed.len();
    if size > size_limit {
        metrics::increment_snapshots_skipped();
        warn!(
            repository = %repository,
            size,
            limit = size_limit,
            "Repository snapshot exceeds size limit, not storing"
        );
        return Ok(SnapshotOutcome::Skipped {
            size,
            limit: size_limit,
        });
    }

    let secret_name = format!("{repository}-repository");
    let checksum = payload.fingerprint();
    if let Some(existing) = cluster.get_secret(namespace, &secret_name).await? {
        if existing.annotations.get(CHECKSUM_ANNOTATION) == Some(&checksum) {
            debug!(secret = %secret_name, "Snapshot unchanged");
            return Ok(SnapshotOutcome::Unchanged { secret_name });
        }
    }

    let secret = SecretData {
        type_: "Opaque".to_string(),
        data: BTreeMap::from([(format!("{repository}.gz"), compressed)]),
        annotations: BTreeMap::from([(CHECKSUM_ANNOTATION.to_string(), checksum)]),
    };
    cluster.apply_secret(namespace, &secret_name, &secret).await?;
    info!(secret = %secret_name, size, "Stored repository snapshot");
    Ok(SnapshotOutcome::Stored { secret_name, size })
}
