//! # Error Policy
//!
//! Requeue policy for failed Gateway reconciliations. Reconciliation only
//! registers jobs, so failures are Kubernetes API trouble and retried with a
//! fixed delay.

use super::watch_loop::WatchContext;
use crate::crd::Gateway;
use crate::error::SyncError;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Delay before a failed reconciliation is retried
pub const ERROR_REQUEUE: Duration = Duration::from_secs(30);

pub fn error_policy(gateway: Arc<Gateway>, error: &SyncError, _context: Arc<WatchContext>) -> Action {
    if error.is_transient() {
        warn!(gateway = %gateway.instance_key(), error = %error, "Gateway reconciliation failed, retrying");
    } else {
        error!(gateway = %gateway.instance_key(), error = %error, "Gateway reconciliation failed");
    }
    Action::requeue(ERROR_REQUEUE)
}
