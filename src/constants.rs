//! # Constants
//!
//! Default values, label and annotation keys, and endpoint paths shared across the controller.

/// Default synchronization interval per domain (seconds)
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 10;

/// Default scheduler tick (milliseconds)
pub const DEFAULT_SCHEDULER_TICK_MS: u64 = 1000;

/// Default lifetime of a checksum cache entry (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Default interval between checksum cache sweeps (seconds)
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Compressed repository snapshots above this size are not stored in a Secret.
/// Kubernetes Secrets are capped at 1MiB including metadata.
pub const DEFAULT_SNAPSHOT_SIZE_LIMIT_BYTES: usize = 900 * 1024;

/// Default gateway management port
pub const DEFAULT_GATEWAY_MANAGEMENT_PORT: u16 = 9443;

/// Default HTTP server port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default base path for materialized repositories
pub const DEFAULT_SYNC_BASE_PATH: &str = "/tmp/gateway-sync";

/// Label used to select the pods of a gateway fleet
pub const DEFAULT_GATEWAY_LABEL_KEY: &str = "app.kubernetes.io/name";

/// Field manager used for server-side apply and patches
pub const FIELD_MANAGER: &str = "gateway-config-controller";

/// Suffix shared by all marker keys
pub const MARKER_DOMAIN: &str = "gateway-config.io";

/// Label on the elected management pod
pub const MANAGEMENT_POD_LABEL: &str = "gateway-config.io/management-access";

/// Value of [`MANAGEMENT_POD_LABEL`] on the elected pod
pub const MANAGEMENT_POD_LABEL_VALUE: &str = "leader";

/// Annotation carrying the checksum of a published certificate secret
pub const CHECKSUM_ANNOTATION: &str = "gateway-config.io/checksum";

/// Graphman endpoint path on the gateway management port
pub const GRAPHMAN_PATH: &str = "/graphman";

/// Legacy restman endpoint path
pub const RESTMAN_PATH: &str = "/restman";

/// Header carrying the base64 encoded bundle encryption passphrase
pub const PASSPHRASE_HEADER: &str = "l7-passphrase";

/// Key prefix of the management secret holding the admin username
pub const MANAGEMENT_USERNAME_KEY: &str = "username";

/// Key prefix of the management secret holding the admin password
pub const MANAGEMENT_PASSWORD_KEY: &str = "password";

/// Maximum length of the name part of a label key and of a label value
pub const LABEL_MAX_LENGTH: usize = 63;
