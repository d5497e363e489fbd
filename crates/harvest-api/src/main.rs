//! Harvest API - paddy extent and production prediction service
//!
//! Loads the pretrained models once at startup and serves predictions over
//! HTTP. Startup aborts if any configured season fails to load.

use anyhow::Result;
use harvest_api::{api, build_state, config::ServiceConfig};
use harvest_lib::{health::HealthRegistry, observability::StructuredLogger};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting harvest-api");

    let config = ServiceConfig::load()?;
    info!(
        model_dir = %config.model_dir.display(),
        seasons = ?config.seasons,
        "Service configured"
    );

    let logger = StructuredLogger::new("harvest-api");
    let health_registry = HealthRegistry::new();

    let state = build_state(&config, health_registry, &logger).await?;
    let cors = api::cors_layer(&config.cors_origins)?;
    let router = api::create_router(Arc::new(state), cors);

    logger.log_startup(SERVICE_VERSION, config.api_port);

    let shutdown_logger = logger.clone();
    api::serve(config.api_port, router, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
