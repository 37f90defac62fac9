//! # Repository Resolvers
//!
//! Fetch and fingerprint configuration sources. Every resolver produces a
//! fingerprint and the materialized content:
//!
//! - `git`: clone or pull; fingerprint is the HEAD commit. Tags are fetched at
//!   most once per process, branches on every call.
//! - `http`: download a `.zip`, `.tar` or `.tar.gz` archive and extract it once;
//!   fingerprint is the hash of the downloaded bytes.
//! - `local`: read a Secret; fingerprint is the hash of its data.
//! - `statestore`: read a key from a remote store; fingerprint is the hash of the value.

mod auth;
mod git;
mod http;
mod local;
pub mod snapshot;
mod state_store;

pub use auth::RepositoryCredentials;
pub use git::GitResolver;
pub use http::{extract_archive, ArchiveKind, HttpResolver};
pub use local::LocalResolver;
pub use state_store::{RedisStateStoreProvider, StateStoreProvider, StateStoreResolver};

use crate::bundle::{load_from_files, load_from_tree, RepositoryPayload};
use crate::crd::{Repository, RepositoryType};
use crate::error::SyncError;
use crate::observability::metrics;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Where resolved content lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// Checked-out or extracted tree on local disk
    Directory(PathBuf),
    /// Files held in memory
    Files(BTreeMap<String, Vec<u8>>),
}

/// Fingerprinted repository content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRepository {
    /// Commit hash or content hash
    pub fingerprint: String,
    pub materialized: Materialized,
}

impl ResolvedRepository {
    /// Bundle content below `directories`
    pub fn load(
        &self,
        directories: &[String],
        format: crate::crd::BundleFormat,
    ) -> Result<RepositoryPayload, SyncError> {
        match &self.materialized {
            Materialized::Directory(path) => load_from_tree(path, directories, format),
            Materialized::Files(files) => load_from_files(files, format),
        }
    }
}

/// Resolves a Repository resource to fingerprinted content
#[async_trait]
pub trait RepositoryResolver: Send + Sync {
    async fn resolve(&self, repository: &Repository) -> Result<ResolvedRepository, SyncError>;
}

/// Dispatches to the resolver matching the repository type
#[derive(Clone)]
pub struct Resolvers {
    git: Arc<dyn RepositoryResolver>,
    http: Arc<dyn RepositoryResolver>,
    local: Arc<dyn RepositoryResolver>,
    state_store: Arc<dyn RepositoryResolver>,
}

impl std::fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolvers").finish_non_exhaustive()
    }
}

impl Resolvers {
    pub fn new(
        git: Arc<dyn RepositoryResolver>,
        http: Arc<dyn RepositoryResolver>,
        local: Arc<dyn RepositoryResolver>,
        state_store: Arc<dyn RepositoryResolver>,
    ) -> Self {
        Self {
            git,
            http,
            local,
            state_store,
        }
    }
}

#[async_trait]
impl RepositoryResolver for Resolvers {
    async fn resolve(&self, repository: &Repository) -> Result<ResolvedRepository, SyncError> {
        let repository_type = repository.spec.r#type;
        let resolver = match repository_type {
            RepositoryType::Git => &self.git,
            RepositoryType::Http => &self.http,
            RepositoryType::Local => &self.local,
            RepositoryType::StateStore => &self.state_store,
        };

        let start = Instant::now();
        metrics::increment_resolutions(repository_type.as_str());
        let result = resolver.resolve(repository).await;
        metrics::observe_resolution_duration(
            repository_type.as_str(),
            start.elapsed().as_secs_f64(),
        );
        if result.is_err() {
            metrics::increment_resolution_errors(repository_type.as_str());
        }
        result
    }
}

/// One lock per Repository, held from resolution until its files are loaded.
///
/// Gateways referencing the same Repository share its checkout directory, so a
/// clone, pull or extraction must not run while another job walks the tree.
#[derive(Debug, Default)]
pub struct CheckoutLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CheckoutLocks {
    pub async fn lock(&self, repository: &Repository) -> OwnedMutexGuard<()> {
        let key = format!(
            "{}/{}",
            repository.repository_namespace(),
            repository.repository_name()
        );
        let lock = Arc::clone(self.locks.lock().await.entry(key).or_default());
        lock.lock_owned().await
    }
}

/// `<base>/<kind>/<namespace>/<name>` with each component reduced to a safe path segment
pub(crate) fn checkout_path(base: &std::path::Path, kind: &str, repository: &Repository) -> PathBuf {
    base.join(kind)
        .join(sanitize_path_component(repository.repository_namespace()))
        .join(sanitize_path_component(repository.repository_name()))
}

pub(crate) fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Endpoint of a remote repository, required for git and http
pub(crate) fn endpoint(repository: &Repository) -> Result<&str, SyncError> {
    repository
        .spec
        .endpoint
        .as_deref()
        .filter(|endpoint| !endpoint.is_empty())
        .ok_or_else(|| {
            SyncError::configuration(format!(
                "repository '{}' has no endpoint",
                repository.repository_name()
            ))
        })
}
