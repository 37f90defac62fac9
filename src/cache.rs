//! # Checksum Cache
//!
//! Time-bounded key/value store used to deduplicate in-flight and recently
//! completed synchronization attempts.
//!
//! Keys are built as `<domain>:<target>` (see [`cache_key`]). Readers check for an
//! existing entry before starting an attempt; expired entries are invisible to
//! readers and are physically evicted by a background sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Shared checksum cache
#[derive(Debug)]
pub struct ChecksumCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

/// Build a cache key from a domain and the identity of its target
pub fn cache_key(domain: &str, target: &str) -> String {
    format!("{domain}:{target}")
}

impl<V: Clone + Send + Sync + 'static> ChecksumCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Default lifetime of new entries
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the value for `key` unless it has expired
    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Insert with the default lifetime
    pub async fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.ttl).await;
    }

    pub async fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.insert_with_expiry(key, value, Instant::now() + ttl)
            .await;
    }

    pub async fn insert_with_expiry(&self, key: impl Into<String>, value: V, expires_at: Instant) {
        self.entries
            .write()
            .await
            .insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Insert only when no live entry exists. Returns `true` when the entry was created.
    ///
    /// Claims a delivery so a concurrent attempt for the same fingerprint backs
    /// off. The claim lapses after the TTL if its holder never removes it.
    pub async fn try_claim(&self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.get(&key).is_some_and(|entry| entry.expires_at > now) {
            return false;
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
        true
    }

    pub async fn remove(&self, key: &str) -> Option<V> {
        self.entries
            .write()
            .await
            .remove(key)
            .map(|entry| entry.value)
    }

    /// Number of stored entries, expired or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evict every entry that expired at or before `now`. Returns the number evicted.
    pub async fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Start the background sweep
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let evicted = cache.sweep_at(Instant::now()).await;
                if evicted > 0 {
                    debug!(evicted, "Swept expired checksum cache entries");
                }
            }
        })
    }
}
