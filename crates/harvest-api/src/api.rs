//! HTTP API: prediction, activity history, health and Prometheus metrics

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use harvest_lib::{
    auth::{extract_bearer, AuthError, TokenVerifier},
    health::{components, ComponentStatus, HealthRegistry},
    observability::{ServiceMetrics, StructuredLogger},
    predictor::PredictionPipeline,
    store::{PredictionStore, StoreError},
    PredictionError, PredictionRecord, PredictionRequest, PredictionResult, RecordId,
    UserIdentity,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Hard cap on `/activity?limit=`
pub const MAX_ACTIVITY_LIMIT: usize = 100;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: PredictionPipeline,
    pub store: Arc<dyn PredictionStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub health_registry: HealthRegistry,
    pub metrics: ServiceMetrics,
    pub logger: StructuredLogger,
    pub store_timeout: Duration,
    pub activity_limit: usize,
}

impl AppState {
    pub fn new(
        pipeline: PredictionPipeline,
        store: Arc<dyn PredictionStore>,
        verifier: Arc<dyn TokenVerifier>,
        health_registry: HealthRegistry,
    ) -> Self {
        Self {
            pipeline,
            store,
            verifier,
            health_registry,
            metrics: ServiceMetrics::new(),
            logger: StructuredLogger::new("harvest-api"),
            store_timeout: Duration::from_secs(2),
            activity_limit: 5,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_activity_limit(mut self, limit: usize) -> Self {
        self.activity_limit = limit.clamp(1, MAX_ACTIVITY_LIMIT);
        self
    }
}

/// Errors returned to HTTP clients as `{"error": <reason>, "message": <text>}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Prediction(#[from] PredictionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    InvalidBody(String),

    #[error("{0}")]
    InvalidQuery(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ApiError {
    fn status_and_reason(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Prediction(e) => {
                let status = match e {
                    _ if e.is_client_error() => StatusCode::BAD_REQUEST,
                    PredictionError::UnsupportedSeason(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.reason())
            }
            ApiError::Auth(AuthError::MissingCredentials) => {
                (StatusCode::UNAUTHORIZED, "missing_credentials")
            }
            ApiError::Auth(AuthError::Unauthorized) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            ApiError::InvalidBody(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_body"),
            ApiError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "invalid_query"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason) = self.status_and_reason();
        let body = ErrorBody {
            error: reason.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidQuery(rejection.body_text())
    }
}

/// Identity resolved from the `Authorization` header
pub struct AuthenticatedUser(pub UserIdentity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        let user = state.verifier.verify(extract_bearer(header))?;
        Ok(AuthenticatedUser(user))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predicted_extent: Option<f64>,
    pub predicted_production: f64,
    pub record_id: Option<RecordId>,
}

impl PredictionResponse {
    fn new(result: PredictionResult, record_id: Option<RecordId>) -> Self {
        Self {
            predicted_extent: result.predicted_extent,
            predicted_production: result.predicted_production,
            record_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

fn run_pipeline(
    state: &AppState,
    request: &PredictionRequest,
    user: Option<&UserIdentity>,
) -> Result<PredictionResult, ApiError> {
    match state.pipeline.predict(request) {
        Ok(result) => {
            state.logger.log_prediction(
                user.map(|u| u.uid.as_str()),
                &request.season,
                &request.district,
                request.year,
                &result,
            );
            Ok(result)
        }
        Err(e) => {
            state
                .logger
                .log_rejected(&request.season, &request.district, e.reason(), &e.to_string());
            Err(e.into())
        }
    }
}

/// Persist a finished prediction. Failures are logged and reported as `None`;
/// the prediction itself is still returned to the caller.
async fn persist(
    state: &AppState,
    user: &UserIdentity,
    request: &PredictionRequest,
    result: &PredictionResult,
) -> Option<RecordId> {
    let outcome = tokio::time::timeout(state.store_timeout, state.store.save(user, request, result)).await;

    let error = match outcome {
        Ok(Ok(id)) => {
            state.metrics.inc_records_saved();
            state.logger.log_record_saved(&user.uid, &id);
            state.health_registry.set_healthy(components::STORE).await;
            return Some(id);
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("store call exceeded {}ms", state.store_timeout.as_millis()),
    };

    state.metrics.inc_record_save_errors();
    state.logger.log_record_save_failed(&user.uid, &error);
    state
        .health_registry
        .set_degraded(components::STORE, error)
        .await;
    None
}

/// Authenticated prediction, persisted for the caller
async fn predict_production(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Json(request) = payload?;
    let result = run_pipeline(&state, &request, Some(&user))?;
    let record_id = persist(&state, &user, &request, &result).await;
    Ok(Json(PredictionResponse::new(result, record_id)))
}

/// Anonymous prediction, not persisted
async fn predict_anonymous(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Json(request) = payload?;
    let result = run_pipeline(&state, &request, None)?;
    Ok(Json(PredictionResponse::new(result, None)))
}

/// The caller's most recent predictions, newest first
async fn recent_activity(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    query: Result<Query<ActivityQuery>, QueryRejection>,
) -> Result<Json<Vec<PredictionRecord>>, ApiError> {
    let Query(query) = query?;
    let limit = query
        .limit
        .unwrap_or(state.activity_limit)
        .min(MAX_ACTIVITY_LIMIT);
    let records = state.store.list(&user, limit).await?;
    Ok(Json(records))
}

async fn activity_record(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<PredictionRecord>, ApiError> {
    let record = state.store.get(&user, &id).await?;
    Ok(Json(record))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once models are loaded
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// CORS policy: any origin when `origins` is empty, otherwise the listed ones
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }

    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o).map_err(|e| anyhow::anyhow!("Invalid CORS origin '{}': {}", o, e)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/production/predict", post(predict_production))
        .route("/predict", post(predict_anonymous))
        .route("/predict/", post(predict_anonymous))
        .route("/activity", get(recent_activity))
        .route("/activity/:id", get(activity_record))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve(
    port: u16,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
