//! MaaS toolbox server - tier-to-group mappings and LLMInferenceService tiers

use anyhow::Context;
use clap::Parser;

use maas_api::config::Config;
use maas_api::server::{build_state, serve};
use maas_common::kube_utils::{create_client_with_timeout, DEFAULT_CONNECT_TIMEOUT};
use maas_common::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        namespace = %config.namespace,
        configmap = %config.configmap_name,
        "Starting MaaS toolbox"
    );

    let client = create_client_with_timeout(DEFAULT_CONNECT_TIMEOUT, config.request_timeout())
        .await
        .context("failed to create Kubernetes client")?;

    let state = build_state(client, &config)
        .await
        .context("failed to initialize tier registry")?;

    serve(state, &config).await.context("server error")?;
    Ok(())
}
