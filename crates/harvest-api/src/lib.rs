//! HTTP service for paddy harvest prediction
//!
//! Wires the prediction pipeline, record store and token verifier from
//! `harvest-lib` into an axum router.

pub mod api;
pub mod config;

use anyhow::{Context, Result};
use harvest_lib::{
    auth::StaticTokenVerifier,
    health::{components, HealthRegistry},
    observability::{ServiceMetrics, StructuredLogger},
    predictor::{ModelRegistry, PredictionPipeline},
    store::MemoryStore,
};
use std::sync::Arc;
use std::time::Duration;

/// Build the model registry, store and verifier described by `config`.
///
/// Fails if any configured season cannot be fully loaded.
pub async fn build_state(
    config: &config::ServiceConfig,
    health_registry: HealthRegistry,
    logger: &StructuredLogger,
) -> Result<api::AppState> {
    let seasons = config.parsed_seasons()?;

    health_registry.register(components::MODEL_REGISTRY).await;
    health_registry.register(components::STORE).await;

    let loaded = if config.fallback_models {
        ModelRegistry::fallback(&seasons)
    } else {
        ModelRegistry::load(&config.model_dir, &seasons)
    };
    let registry = loaded
        .with_context(|| format!("Failed to load models from {}", config.model_dir.display()))?;

    let metrics = ServiceMetrics::new();
    for season in registry.seasons() {
        for role in registry.get_models(season)?.roles() {
            metrics.set_model_loaded(season, role);
        }
    }
    logger.log_models_loaded(&registry.seasons(), config.fallback_models);
    if config.fallback_models {
        health_registry
            .set_degraded(components::MODEL_REGISTRY, "serving fallback regressors")
            .await;
    }

    let store = match &config.store_path {
        Some(path) => MemoryStore::with_snapshot(path.clone()),
        None => MemoryStore::new(),
    };

    let verifier = StaticTokenVerifier::new(config.auth_tokens.clone());
    if verifier.is_empty() {
        tracing::warn!("No auth tokens configured, authenticated endpoints will reject every request");
    }

    let seasons_loaded = registry.seasons();
    let pipeline = PredictionPipeline::new(Arc::new(registry));
    let state = api::AppState::new(
        pipeline,
        Arc::new(store),
        Arc::new(verifier),
        health_registry.clone(),
    )
    .with_store_timeout(Duration::from_millis(config.store_timeout_ms))
    .with_activity_limit(config.activity_limit);

    health_registry.mark_ready(seasons_loaded).await;
    Ok(state)
}
