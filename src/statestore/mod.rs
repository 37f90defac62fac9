//! # State Store
//!
//! Remote key-value storage of repository snapshots, plus the delta engine.
//!
//! The first sync of a repository writes the full gzip-compressed bundle under
//! `...:latest`. Later syncs read `latest` back, compute the delta to the new
//! bundle, and write the combined snapshot to `latest` and the change-set to
//! `...:delta`.

mod delta;
mod redis_store;

pub use delta::{combine, delta};
pub use redis_store::RedisStateStore;

use crate::bundle::Bundle;
use crate::crd::StateStoreSpec;
use crate::error::SyncError;
use crate::repository::snapshot::{gunzip, gzip};
use async_trait::async_trait;
use tracing::{debug, info};

/// Byte-oriented access to a remote store
#[async_trait]
pub trait StateStoreClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncError>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncError>;
}

/// What a snapshot write did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotWrite {
    /// No previous snapshot; the full bundle was written to `latest`
    Initial,
    /// `latest` was replaced by the combined snapshot and the delta was written
    Delta { changed: usize, removed: usize },
    /// `latest` already matched
    Unchanged,
}

/// Read a gzip-compressed bundle stored under `key`
pub async fn read_bundle(
    store: &dyn StateStoreClient,
    key: &str,
) -> Result<Option<Bundle>, SyncError> {
    let Some(compressed) = store.get(key).await? else {
        return Ok(None);
    };
    let raw = gunzip(&compressed)?;
    let document: serde_json::Value = serde_json::from_slice(&raw)?;
    Ok(Some(Bundle::from_json(&document)?))
}

async fn write_bundle(
    store: &dyn StateStoreClient,
    key: &str,
    bundle: &Bundle,
) -> Result<(), SyncError> {
    let raw = serde_json::to_vec(&bundle.to_json())?;
    store.set(key, &gzip(&raw)?).await
}

/// Persist `current` for `storage_secret_name`, writing a delta against the previous snapshot
pub async fn write_snapshot(
    store: &dyn StateStoreClient,
    spec: &StateStoreSpec,
    storage_secret_name: &str,
    current: &Bundle,
) -> Result<SnapshotWrite, SyncError> {
    let latest_key = spec.latest_key(storage_secret_name);
    let current = current.without_deletes();

    let Some(previous) = read_bundle(store, &latest_key).await? else {
        write_bundle(store, &latest_key, &current).await?;
        info!(key = %latest_key, "Wrote initial state store snapshot");
        return Ok(SnapshotWrite::Initial);
    };

    let change = delta(&previous, &current);
    if change.is_empty() {
        debug!(key = %latest_key, "State store snapshot unchanged");
        return Ok(SnapshotWrite::Unchanged);
    }

    let combined = combine(&change, &previous);
    write_bundle(store, &spec.delta_key(storage_secret_name), &change).await?;
    write_bundle(store, &latest_key, &combined).await?;

    let removed = change.deletes().values().map(std::collections::BTreeSet::len).sum();
    info!(
        key = %latest_key,
        changed = change.entity_count(),
        removed,
        "Wrote state store delta"
    );
    Ok(SnapshotWrite::Delta {
        changed: change.entity_count(),
        removed,
    })
}
