use anyhow::{Context, Result};
use flux_bridge::backend::{Backend, KubeBackend};
use flux_bridge::config::BridgeConfig;
use flux_bridge::http::{self, AppState};
use flux_bridge::storage::ArtifactStore;
use flux_bridge::Controller;
use kube_client::KubeClient;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    let config = BridgeConfig::from_env()?;
    info!(
        "Starting flux-bridge in namespace {} (artifacts under {})",
        config.namespace,
        config.data_dir.display()
    );

    let store = ArtifactStore::from_config(config.storage_config())
        .context("Failed to open artifact store")?;

    let client = KubeClient::from_config(&config.kube)
        .await
        .context("Failed to build Kubernetes client")?;
    match client.health_check().await {
        Ok(true) => info!("Kubernetes API at {} is ready", config.kube.api_url),
        Ok(false) => warn!("Kubernetes API at {} is not ready", config.kube.api_url),
        Err(e) => warn!("Kubernetes API readiness check failed: {:#}", e),
    }
    let backend: Arc<dyn Backend> =
        Arc::new(KubeBackend::new(client, &config.kube.field_manager));

    let controller = Controller::connect(backend, Arc::new(store), config.controller_config())
        .await
        .context("Failed to reach Flux resources")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let state = Arc::new(AppState::new(Arc::new(controller), shutdown.clone()));
    http::start_server(state, config.addr).await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }

    cancel.cancel();
}
