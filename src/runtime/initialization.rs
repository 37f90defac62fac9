//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, server startup,
//! Kubernetes client, sync components and registration of existing Gateways.

use super::server::{start_server, ServerState};
use super::watch_loop::{reconcile_gateway, WatchContext};
use crate::cache::ChecksumCache;
use crate::cluster::{ClusterClient, KubeClusterClient};
use crate::config::{load_config, ControllerConfig, ServerConfig};
use crate::crd::Gateway;
use crate::delivery::{FleetDelivery, HttpGatewayClient, WebhookNotifier};
use crate::observability;
use crate::repository::{
    CheckoutLocks, GitResolver, HttpResolver, LocalResolver, RedisStateStoreProvider,
    RepositoryResolver, Resolvers, StateStoreProvider, StateStoreResolver,
};
use crate::scheduler::Scheduler;
use crate::sync::SyncContext;
use anyhow::{Context, Result};
use kube::{api::Api, api::ListParams, Client};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    /// Gateways in the watched namespace, or all namespaces
    pub gateways: Api<Gateway>,
    pub context: Arc<WatchContext>,
    pub server_state: Arc<ServerState>,
}

/// Initialize the controller runtime
pub async fn initialize() -> Result<InitializationResult> {
    // Required for rustls 0.23+ before any TLS connection is made
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway_config_controller=info".into()),
        )
        .init();

    info!("Starting Gateway Config Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let (controller_config, server_config) = load_config();
    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let gateways: Api<Gateway> = match &controller_config.watch_namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };

    let context = Arc::new(build_context(client.clone(), controller_config)?);
    context
        .sync
        .cache
        .spawn_sweeper(context.sync.config.cache_sweep_interval);

    reconcile_existing_gateways(&gateways, &context).await;

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        gateways,
        context,
        server_state,
    })
}

/// Wire the Kubernetes-backed sync components
pub fn build_context(client: Client, config: ControllerConfig) -> Result<WatchContext> {
    let cluster: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::new(client));
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let state_stores: Arc<dyn StateStoreProvider> =
        Arc::new(RedisStateStoreProvider::new(Arc::clone(&cluster)));
    let resolver: Arc<dyn RepositoryResolver> = Arc::new(Resolvers::new(
        Arc::new(GitResolver::new(&config.base_path, Arc::clone(&cluster))),
        Arc::new(HttpResolver::new(
            &config.base_path,
            Arc::clone(&cluster),
            http.clone(),
        )),
        Arc::new(LocalResolver::new(Arc::clone(&cluster))),
        Arc::new(StateStoreResolver::new(Arc::clone(&state_stores))),
    ));
    let delivery = FleetDelivery::new(
        Arc::clone(&cluster),
        Arc::new(HttpGatewayClient::new().context("Failed to build gateway client")?),
        Arc::new(WebhookNotifier::new(http)),
    );

    let scheduler = Arc::new(Scheduler::new(config.scheduler_tick));
    let cache = Arc::new(ChecksumCache::new(config.cache_ttl));
    Ok(WatchContext {
        scheduler,
        sync: Arc::new(SyncContext {
            config,
            cluster,
            delivery,
            resolver,
            state_stores,
            cache,
            checkout_locks: CheckoutLocks::default(),
        }),
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = config.startup_timeout;
    let poll_interval = config.poll_interval;
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Register jobs for Gateways that existed before the controller started
async fn reconcile_existing_gateways(gateways: &Api<Gateway>, context: &Arc<WatchContext>) {
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.reconcile_existing",
        operation = "reconcile_existing_gateways"
    );
    let _guard = span.enter();

    let list = match gateways.list(&ListParams::default()).await {
        Ok(list) => list,
        Err(e) => {
            error!("Gateway CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - the watch will retry");
            return;
        }
    };

    if list.items.is_empty() {
        info!("No existing Gateway resources found, watch will pick up new resources");
        return;
    }

    let mut by_namespace: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for gateway in &list.items {
        by_namespace
            .entry(gateway.gateway_namespace())
            .or_default()
            .push(gateway.gateway_name());
    }

    info!("Gateway Config Controller - Startup Resource Summary");
    info!("Total Gateways: {}", list.items.len());
    info!("Namespaces: {}", by_namespace.len());
    for (namespace, names) in &mut by_namespace {
        names.sort_unstable();
        let shown = if names.len() <= 3 {
            names.join(", ")
        } else {
            format!("{}, ... ({} total)", names[..3].join(", "), names.len())
        };
        info!("Namespace: {}", namespace);
        info!("  Gateways ({}): {}", names.len(), shown);
    }

    for gateway in list.items {
        let key = gateway.instance_key();
        match reconcile_gateway(Arc::new(gateway), Arc::clone(context)).await {
            Ok(_) => info!(gateway = %key, "Registered existing Gateway"),
            Err(e) => error!(gateway = %key, error = %e, "Failed to register existing Gateway"),
        }
    }
}
