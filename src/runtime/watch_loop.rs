//! # Watch Loop
//!
//! Watches Gateway resources. Every apply event registers the Gateway's enabled
//! domain jobs and triggers them once, so Gateway edits apply without waiting
//! for the next interval. Jobs deregister themselves when their Gateway or
//! domain goes away.

use super::error_policy::error_policy;
use super::server::ServerState;
use crate::crd::Gateway;
use crate::error::SyncError;
use crate::observability::metrics;
use crate::scheduler::Scheduler;
use crate::sync::{job_tag, register_gateway_jobs, SyncContext, SyncDomain};
use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::controller::{Action, Controller};
use kube_runtime::watcher;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// State shared by reconciliations
pub struct WatchContext {
    pub scheduler: Arc<Scheduler>,
    pub sync: Arc<SyncContext>,
}

impl std::fmt::Debug for WatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchContext").finish_non_exhaustive()
    }
}

/// Register and trigger the jobs of `gateway`
pub async fn reconcile_gateway(gateway: Arc<Gateway>, context: Arc<WatchContext>) -> Result<Action, SyncError> {
    let registered = register_gateway_jobs(&context.scheduler, &context.sync, &gateway).await;
    if registered > 0 {
        info!(gateway = %gateway.instance_key(), registered, "Registered sync jobs");
    }
    metrics::set_jobs_registered(context.scheduler.tags().await.len());

    for domain in SyncDomain::ALL {
        if domain.is_enabled(&gateway) {
            let tag = job_tag(gateway.gateway_namespace(), gateway.gateway_name(), domain);
            if context.scheduler.run_by_tag(&tag).await.is_none() {
                debug!(tag = %tag, "Job already running, skipping trigger");
            }
        }
    }
    Ok(Action::await_change())
}

/// Run the scheduler and the Gateway controller until a shutdown signal
pub async fn run_watch_loop(
    gateways: Api<Gateway>,
    context: Arc<WatchContext>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(Arc::clone(&context.scheduler).run(shutdown_rx));

    Controller::new(gateways, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_gateway, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((object, _action)) => debug!(gateway = %object.name, "Gateway reconciled"),
                Err(e) => error!(error = %e, "Gateway controller error"),
            }
        })
        .await;

    info!("Controller shutting down");
    server_state.is_ready.store(false, Ordering::Relaxed);
    // The receiver is gone only if the scheduler already stopped
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        error!(error = %e, "Scheduler task failed");
    }
    Ok(())
}
