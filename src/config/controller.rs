//! # Sync Configuration
//!
//! Scheduler, cache, repository and delivery settings.

use super::env_var_or_default;
use crate::constants::*;
use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Root directory for cloned and extracted repositories
    pub base_path: PathBuf,
    /// Interval used by domain jobs that do not override it
    pub default_sync_interval: Duration,
    /// How often the scheduler looks for due jobs
    pub scheduler_tick: Duration,
    /// Lifetime of a checksum cache entry
    pub cache_ttl: Duration,
    /// How often expired cache entries are evicted
    pub cache_sweep_interval: Duration,
    /// Compressed snapshots larger than this are not written to a Secret
    pub snapshot_size_limit: usize,
    /// Gateway management port used when the Gateway does not set one
    pub management_port: u16,
    /// Label key selecting a gateway's pods; the value is the Gateway name
    pub gateway_label_key: String,
    /// Namespace to watch; `None` watches all namespaces
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from(DEFAULT_SYNC_BASE_PATH),
            default_sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            scheduler_tick: Duration::from_millis(DEFAULT_SCHEDULER_TICK_MS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_sweep_interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
            snapshot_size_limit: DEFAULT_SNAPSHOT_SIZE_LIMIT_BYTES,
            management_port: DEFAULT_GATEWAY_MANAGEMENT_PORT,
            gateway_label_key: DEFAULT_GATEWAY_LABEL_KEY.to_string(),
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let watch_namespace = std::env::var("WATCH_NAMESPACE")
            .ok()
            .filter(|ns| !ns.trim().is_empty());

        Self {
            base_path: PathBuf::from(env_var_or_default(
                "SYNC_BASE_PATH",
                DEFAULT_SYNC_BASE_PATH.to_string(),
            )),
            default_sync_interval: Duration::from_secs(env_var_or_default(
                "DEFAULT_SYNC_INTERVAL_SECS",
                DEFAULT_SYNC_INTERVAL_SECS,
            )),
            scheduler_tick: Duration::from_millis(env_var_or_default(
                "SCHEDULER_TICK_MS",
                DEFAULT_SCHEDULER_TICK_MS,
            )),
            cache_ttl: Duration::from_secs(env_var_or_default(
                "CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL_SECS,
            )),
            cache_sweep_interval: Duration::from_secs(env_var_or_default(
                "CACHE_SWEEP_INTERVAL_SECS",
                DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
            )),
            snapshot_size_limit: env_var_or_default(
                "SNAPSHOT_SIZE_LIMIT_BYTES",
                DEFAULT_SNAPSHOT_SIZE_LIMIT_BYTES,
            ),
            management_port: env_var_or_default(
                "GATEWAY_MANAGEMENT_PORT",
                DEFAULT_GATEWAY_MANAGEMENT_PORT,
            ),
            gateway_label_key: env_var_or_default(
                "GATEWAY_LABEL_KEY",
                DEFAULT_GATEWAY_LABEL_KEY.to_string(),
            ),
            watch_namespace,
        }
    }
}
