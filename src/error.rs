//! # Sync Errors
//!
//! Error taxonomy for synchronization attempts.
//!
//! Configuration errors are fatal for the attempt and recur on every tick until the
//! user fixes the resource. Transient errors are logged and left for the next tick.

use thiserror::Error;

/// Error raised by a synchronization attempt
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing reference, unsupported repository type or extension, malformed auth
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Network failure, target not ready, or similar
    #[error("transient error: {0}")]
    Transient(String),
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("state store error: {0}")]
    StateStore(#[from] redis::RedisError),
}

impl SyncError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Whether the next tick may succeed without the user changing anything
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Configuration(_) | SyncError::Serialization(_) => false,
            SyncError::Kube(kube::Error::Api(api_err)) => {
                // A referenced object that does not exist is a configuration problem
                !(api_err.code == 404 || api_err.code == 422 || api_err.code == 400)
            }
            SyncError::Transient(_)
            | SyncError::Kube(_)
            | SyncError::Http(_)
            | SyncError::Io(_)
            | SyncError::StateStore(_) => true,
        }
    }

    /// Human-readable classification for logs and metrics
    pub fn kind(&self) -> &'static str {
        if self.is_transient() {
            "transient"
        } else {
            "configuration"
        }
    }
}

/// Whether a kube error is a 404
pub fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(api_err) if api_err.code == 404)
}

/// Whether a kube error is an optimistic concurrency conflict
pub fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(api_err) if api_err.code == 409)
}
