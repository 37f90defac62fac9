//! Repositories read from a remote state store, and connections to those stores.

use super::snapshot::gunzip;
use super::{Materialized, RepositoryResolver, ResolvedRepository};
use crate::bundle::sha224_hex;
use crate::cluster::ClusterClient;
use crate::crd::{Repository, StateStore};
use crate::error::SyncError;
use crate::statestore::{RedisStateStore, StateStoreClient};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

/// Opens clients for StateStore resources
#[async_trait]
pub trait StateStoreProvider: Send + Sync {
    /// Client for the StateStore `name` in `namespace`, with its spec
    async fn open(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(StateStore, Arc<dyn StateStoreClient>), SyncError>;
}

/// [`StateStoreProvider`] for redis stores, reusing connections per store URL
pub struct RedisStateStoreProvider {
    cluster: Arc<dyn ClusterClient>,
    connections: RwLock<HashMap<String, Arc<RedisStateStore>>>,
}

impl std::fmt::Debug for RedisStateStoreProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateStoreProvider").finish_non_exhaustive()
    }
}

impl RedisStateStoreProvider {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self {
            cluster,
            connections: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl StateStoreProvider for RedisStateStoreProvider {
    async fn open(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(StateStore, Arc<dyn StateStoreClient>), SyncError> {
        let store = self
            .cluster
            .get_state_store(namespace, name)
            .await?
            .ok_or_else(|| {
                SyncError::configuration(format!("state store {namespace}/{name} not found"))
            })?;
        let redis = &store.spec.redis;
        let cache_key = format!(
            "{namespace}/{name}/{}/{}",
            redis.url,
            redis.database.unwrap_or_default()
        );

        if let Some(connection) = self.connections.read().await.get(&cache_key) {
            let connection = Arc::clone(connection);
            let client: Arc<dyn StateStoreClient> = connection;
            return Ok((store, client));
        }

        let (username, password) = match &redis.existing_secret {
            Some(secret_name) => {
                let secret = self
                    .cluster
                    .get_secret(namespace, secret_name)
                    .await?
                    .ok_or_else(|| {
                        SyncError::configuration(format!(
                            "state store secret {namespace}/{secret_name} not found"
                        ))
                    })?;
                (
                    secret.string("username"),
                    secret.string("password").map(Zeroizing::new),
                )
            }
            None => (None, None),
        };

        let connection = Arc::new(RedisStateStore::connect(redis, username, password).await?);
        self.connections
            .write()
            .await
            .insert(cache_key, Arc::clone(&connection));
        let client: Arc<dyn StateStoreClient> = connection;
        Ok((store, client))
    }
}

/// Reads a named key of a StateStore as repository content
pub struct StateStoreResolver {
    provider: Arc<dyn StateStoreProvider>,
}

impl std::fmt::Debug for StateStoreResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStoreResolver").finish_non_exhaustive()
    }
}

impl StateStoreResolver {
    pub fn new(provider: Arc<dyn StateStoreProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RepositoryResolver for StateStoreResolver {
    async fn resolve(&self, repository: &Repository) -> Result<ResolvedRepository, SyncError> {
        let name = repository.repository_name();
        let (Some(store_name), Some(key)) = (
            repository.spec.state_store_reference.as_deref(),
            repository.spec.state_store_key.as_deref(),
        ) else {
            return Err(SyncError::configuration(format!(
                "statestore repository '{name}' requires both stateStoreReference and stateStoreKey"
            )));
        };

        let (_, client) = self
            .provider
            .open(repository.repository_namespace(), store_name)
            .await?;
        let value = client.get(key).await?.ok_or_else(|| {
            SyncError::transient(format!("key '{key}' not found in state store '{store_name}'"))
        })?;

        let fingerprint = sha224_hex(&value);
        let raw = if value.starts_with(&[0x1f, 0x8b]) {
            gunzip(&value)?
        } else {
            value
        };
        Ok(ResolvedRepository {
            fingerprint,
            materialized: Materialized::Files(BTreeMap::from([(format!("{key}.json"), raw)])),
        })
    }
}
