//! Redis-backed [`StateStoreClient`].

use super::StateStoreClient;
use crate::crd::RedisConfig;
use crate::error::SyncError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::IntoConnectionInfo;
use zeroize::Zeroizing;

/// Redis connection shared by all keys of one StateStore
#[derive(Clone)]
pub struct RedisStateStore {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateStore").finish_non_exhaustive()
    }
}

impl RedisStateStore {
    /// Connect using `config`, with optional credentials read from its Secret
    pub async fn connect(
        config: &RedisConfig,
        username: Option<String>,
        password: Option<Zeroizing<String>>,
    ) -> Result<Self, SyncError> {
        let mut info = config.url.as_str().into_connection_info()?;
        if let Some(database) = config.database {
            info.redis.db = database;
        }
        if username.is_some() {
            info.redis.username = username;
        }
        if let Some(password) = password {
            info.redis.password = Some(password.to_string());
        }
        let client = redis::Client::open(info)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl StateStoreClient for RedisStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncError> {
        let mut connection = self.connection.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncError> {
        let mut connection = self.connection.clone();
        let () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut connection)
            .await?;
        Ok(())
    }
}
