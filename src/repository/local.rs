//! Repositories held in a local Secret.

use super::{Materialized, RepositoryResolver, ResolvedRepository};
use crate::bundle::sha224_hex;
use crate::cluster::ClusterClient;
use crate::crd::Repository;
use crate::error::SyncError;
use async_trait::async_trait;
use std::sync::Arc;

/// Reads bundle files straight from a Secret; nothing is cached
pub struct LocalResolver {
    cluster: Arc<dyn ClusterClient>,
}

impl std::fmt::Debug for LocalResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalResolver").finish_non_exhaustive()
    }
}

impl LocalResolver {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl RepositoryResolver for LocalResolver {
    async fn resolve(&self, repository: &Repository) -> Result<ResolvedRepository, SyncError> {
        let reference = repository.spec.local_reference.as_ref().ok_or_else(|| {
            SyncError::configuration(format!(
                "local repository '{}' has no localReference",
                repository.repository_name()
            ))
        })?;
        let namespace = repository.repository_namespace();
        let secret = self
            .cluster
            .get_secret(namespace, &reference.secret_name)
            .await?
            .ok_or_else(|| {
                SyncError::configuration(format!(
                    "local repository secret {namespace}/{} not found",
                    reference.secret_name
                ))
            })?;

        // Keys are ordered, so the concatenation is stable
        let concatenated: Vec<u8> = secret.data.values().flatten().copied().collect();
        Ok(ResolvedRepository {
            fingerprint: sha224_hex(&concatenated),
            materialized: Materialized::Files(secret.data),
        })
    }
}
