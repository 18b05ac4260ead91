//! Toolbox HTTP server

use std::sync::Arc;

use kube::Client;
use tracing::{error, info};

use maas_common::Result;
use maas_tier::{
    ConfigMapTierStore, KubeInferenceServiceClient, OpenShiftGroupDirectory, TierService,
    WorkloadTiers,
};

use crate::config::Config;
use crate::router::{build_router, AppState};

/// Wire the Kubernetes-backed services into handler state.
///
/// Fails if the registry namespace does not exist.
pub async fn build_state(client: Client, config: &Config) -> Result<AppState> {
    let store = ConfigMapTierStore::new(
        client.clone(),
        config.namespace.clone(),
        config.configmap_name.clone(),
    );
    store.validate_namespace().await?;
    info!(
        namespace = %config.namespace,
        configmap = %config.configmap_name,
        "Tier registry namespace validated"
    );

    let tiers = Arc::new(
        TierService::new(
            Arc::new(store),
            Arc::new(OpenShiftGroupDirectory::new(client.clone())),
        )
        .with_retry(config.retry()),
    );
    let workloads = Arc::new(
        WorkloadTiers::new(
            Arc::new(KubeInferenceServiceClient::new(client)),
            tiers.clone(),
        )
        .with_retry(config.retry()),
    );

    Ok(AppState {
        tiers,
        workloads,
        request_timeout: config.request_timeout(),
    })
}

/// Serve until SIGINT or SIGTERM
pub async fn serve(state: AppState, config: &Config) -> std::io::Result<()> {
    let app = build_router(state);
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "MaaS toolbox listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down");
}
