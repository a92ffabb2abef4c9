//! Workload Attestor - node-local SPIFFE workload attestation agent
//!
//! This binary runs as a DaemonSet on each Kubernetes node, attesting
//! local callers of the Workload API by kernel-reported process id.

use anyhow::{Context, Result};
use attestor_lib::{
    directory::KubeletClient,
    health::{components, HealthRegistry},
    observability::{AttestorMetrics, StructuredLogger},
    runtime::CriRuntime,
    transport::KernelPeerIdentitySource,
    workload_api::{bind_socket, serve, WorkloadApiService},
    Attestor, ServiceAccountIdentityMapper,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting workload-attestor");

    let config = config::AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        trust_domain = %config.trust_domain,
        runtime_endpoint = %config.runtime_endpoint.display(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CONTAINER_RUNTIME).await;
    health_registry.register(components::WORKLOAD_DIRECTORY).await;
    health_registry.register(components::WORKLOAD_API).await;

    let metrics = AttestorMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    let runtime = Arc::new(CriRuntime::new(
        &config.runtime_endpoint,
        config.attestation_timeout(),
    ));
    let directory = Arc::new(
        KubeletClient::new(&config.directory_config())
            .context("Failed to build kubelet client")?,
    );
    let mapper = Arc::new(
        ServiceAccountIdentityMapper::new(&config.trust_domain)
            .context("Failed to configure identity mapping")?,
    );

    let attestor = Attestor::new(
        Arc::new(KernelPeerIdentitySource::global()),
        runtime,
        directory,
    )
    .with_deadline(config.attestation_timeout())
    .with_metrics(metrics.clone())
    .with_health(health_registry.clone());

    let service = WorkloadApiService::new(Arc::new(attestor), mapper, logger.clone());
    let listener = bind_socket(&config.socket_path)?;

    logger.log_startup(AGENT_VERSION, &config.socket_path.display().to_string());
    health_registry.set_ready(true).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        wait_for_shutdown(shutdown_rx.clone()),
    ));

    let workload_api = serve(listener, service, wait_for_shutdown(shutdown_rx));
    tokio::pin!(workload_api);

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            health_registry.set_ready(false).await;
            let _ = shutdown_tx.send(true);
            workload_api.await
        }
        result = &mut workload_api => {
            logger.log_shutdown("Workload API stopped");
            health_registry
                .set_unhealthy(components::WORKLOAD_API, "Workload API server stopped")
                .await;
            let _ = shutdown_tx.send(true);
            result
        }
    };

    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "Health API server failed"),
        Err(e) => warn!(error = %e, "Health API task panicked"),
        Ok(Ok(())) => {}
    }

    if let Err(e) = std::fs::remove_file(&config.socket_path) {
        warn!(error = %e, "Failed to remove Workload API socket");
    }

    info!("Shut down");
    outcome
}
