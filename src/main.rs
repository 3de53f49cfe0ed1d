//! CPAI ExHook - Frigate event enrichment for the MQTT broker
//!
//! Main entry point for the hook service.

use clap::Parser;
use cpai_exhook::{
    ai_client::InferencePool,
    config_store::{ConfigStore, ConfigWatcher},
    pipeline_registry::{Connector, HttpConnector, PipelineRegistry},
    process_coordinator::ProcessCoordinator,
    state::AppState,
    web_api,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MQTT exhook enriching Frigate events with CodeProject.AI inferences
#[derive(Debug, Parser)]
#[command(name = "cpai-exhook", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(env = "CPAI_EXHOOK_CONFIG")]
    config_file: PathBuf,

    /// Listen address, overrides `bind` from the config file
    #[arg(long, env = "CPAI_EXHOOK_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cpai_exhook=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CPAI ExHook v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; without a valid first snapshot there is nothing to serve
    let store = Arc::new(ConfigStore::new(&cli.config_file));
    let config = match store.load().await {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(
                path = %cli.config_file.display(),
                error = %e,
                "Failed to load configuration"
            );
            return Err(e.into());
        }
    };

    let connector: Arc<dyn Connector> = Arc::new(HttpConnector::new()?);
    let registry = PipelineRegistry::build(&config, connector.as_ref()).map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;

    // Pool size is fixed for the process lifetime
    let pool = Arc::new(InferencePool::new(config.threads));
    tracing::info!(threads = pool.size(), processing = ?config.processing, "Inference pool ready");

    let coordinator = Arc::new(ProcessCoordinator::new(registry, config.processing, pool));

    let watcher = Arc::new(ConfigWatcher::new(
        store,
        coordinator.clone(),
        connector,
        Duration::from_secs(config.reload_interval_secs),
    ));
    watcher.start().await;

    let state = AppState::new(coordinator, watcher.clone());
    let app = web_api::create_router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = cli.bind.unwrap_or_else(|| config.bind.to_addr());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    watcher.stop().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
