//! Integration tests for the prediction API endpoints

use failing_store::FailingStore;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use harvest_api::api::{create_router, AppState};
use harvest_lib::{
    auth::StaticTokenVerifier,
    health::{components, HealthRegistry},
    predictor::{LinearRegressor, ModelRegistry, PredictionPipeline},
    store::{MemoryStore, PredictionStore},
    ModelRole, Season,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;

const TOKEN: &str = "good-token";
const OTHER_TOKEN: &str = "other-token";

mod failing_store {
    use harvest_lib::store::{PredictionStore, StoreError};
    use harvest_lib::{PredictionRecord, PredictionRequest, PredictionResult, RecordId, UserIdentity};

    /// Store whose writes always fail
    pub struct FailingStore;

    #[axum::async_trait]
    impl PredictionStore for FailingStore {
        async fn save(
            &self,
            _user: &UserIdentity,
            _request: &PredictionRequest,
            _result: &PredictionResult,
        ) -> Result<RecordId, StoreError> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }

        async fn list(&self, _user: &UserIdentity, _limit: usize) -> Result<Vec<PredictionRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn get(&self, _user: &UserIdentity, id: &str) -> Result<PredictionRecord, StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }
    }
}

fn stub_registry(seasons: &[Season]) -> ModelRegistry {
    let mut builder = ModelRegistry::builder();
    if seasons.contains(&Season::Yala) {
        builder = builder
            .insert(
                Season::Yala,
                ModelRole::Extent,
                Arc::new(LinearRegressor::constant("extent", 2000.0)),
            )
            .insert(
                Season::Yala,
                ModelRole::Production,
                Arc::new(LinearRegressor::scale_area("production", 4.0)),
            );
    }
    if seasons.contains(&Season::Maha) {
        builder = builder.insert(
            Season::Maha,
            ModelRole::Production,
            Arc::new(LinearRegressor::new("maha", 0.0, [0.0, 0.0, 0.0, 1.0, 0.5])),
        );
    }
    builder.build().unwrap()
}

async fn setup_app_with(
    seasons: &[Season],
    store: Arc<dyn PredictionStore>,
) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::MODEL_REGISTRY).await;
    health_registry.register(components::STORE).await;

    let pipeline = PredictionPipeline::new(Arc::new(stub_registry(seasons)));
    let verifier = StaticTokenVerifier::from_tokens([(TOKEN, "farmer-1"), (OTHER_TOKEN, "farmer-2")]);

    let state = Arc::new(AppState::new(
        pipeline,
        store,
        Arc::new(verifier),
        health_registry,
    ));
    let router = create_router(state.clone(), CorsLayer::permissive());
    (router, state)
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    setup_app_with(&Season::ALL, Arc::new(MemoryStore::new())).await
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_with_token(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    (status, value)
}

fn yala_payload() -> Value {
    json!({
        "year": 2022,
        "season": "Yala",
        "district": "ANURADHAPURA",
        "sown_hect": 2500.0,
        "previous_yield": 5000.0
    })
}

fn maha_payload() -> Value {
    json!({
        "year": 2022,
        "season": "Maha",
        "district": "anuradhapura",
        "sown_hect": 2500.0,
        "previous_yield": 5000.0,
        "previous_production": 6000.0
    })
}

#[tokio::test]
async fn test_yala_prediction_is_persisted() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = send(&app, post_json("/production/predict", Some(TOKEN), yala_payload())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predicted_extent"], 2000.0);
    assert_eq!(body["predicted_production"], 8000.0);
    assert_eq!(body["record_id"], "pred-1");
}

#[tokio::test]
async fn test_maha_prediction_has_null_extent() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = send(&app, post_json("/production/predict", Some(TOKEN), maha_payload())).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["predicted_extent"].is_null());
    assert_eq!(body["predicted_production"], 5500.0);
}

#[tokio::test]
async fn test_missing_authorization_rejected() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = send(&app, post_json("/production/predict", None, yala_payload())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_credentials");
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = send(&app, post_json("/production/predict", Some("forged"), yala_payload())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_raw_token_without_scheme_accepted() {
    let (app, _state) = setup_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/production/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, TOKEN)
        .body(Body::from(yala_payload().to_string()))
        .unwrap();
    let (status, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_validation_errors_are_client_faults() {
    let (app, _state) = setup_test_app().await;

    let mut payload = yala_payload();
    payload["district"] = json!("ATLANTIS");
    let (status, body) = send(&app, post_json("/predict/", None, payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown_district");
    assert!(body["message"].as_str().unwrap().contains("ATLANTIS"));

    let mut payload = yala_payload();
    payload["season"] = json!("Summer");
    let (status, body) = send(&app, post_json("/predict/", None, payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_season");

    let mut payload = maha_payload();
    payload.as_object_mut().unwrap().remove("previous_production");
    let (status, body) = send(&app, post_json("/predict/", None, payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_field");

    let mut payload = yala_payload();
    payload["sown_hect"] = json!(-5.0);
    let (status, body) = send(&app, post_json("/predict/", None, payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn test_unsupported_season_is_distinct_from_invalid() {
    let (app, _state) = setup_app_with(&[Season::Yala], Arc::new(MemoryStore::new())).await;

    let (status, body) = send(&app, post_json("/predict/", None, maha_payload())).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "unsupported_season");
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = send(&app, post_json("/predict/", None, json!({"season": "Yala"}))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_body");
}

#[tokio::test]
async fn test_anonymous_prediction_not_persisted() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = send(&app, post_json("/predict/", None, yala_payload())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["record_id"].is_null());
    assert_eq!(body["predicted_production"], 8000.0);

    let (status, body) = send(&app, get_with_token("/activity", Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_activity_lists_newest_first() {
    let (app, _state) = setup_test_app().await;

    send(&app, post_json("/production/predict", Some(TOKEN), yala_payload())).await;
    send(&app, post_json("/production/predict", Some(TOKEN), maha_payload())).await;
    send(&app, post_json("/production/predict", Some(OTHER_TOKEN), yala_payload())).await;

    let (status, body) = send(&app, get_with_token("/activity", Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["season"], "Maha");
    assert_eq!(records[1]["season"], "Yala");
    assert_eq!(records[0]["user_id"], "farmer-1");

    let (_, body) = send(&app, get_with_token("/activity?limit=1", Some(TOKEN))).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_activity_record_scoped_to_owner() {
    let (app, _state) = setup_test_app().await;

    let (_, body) = send(&app, post_json("/production/predict", Some(TOKEN), yala_payload())).await;
    let id = body["record_id"].as_str().unwrap().to_string();

    let (status, record) = send(&app, get_with_token(&format!("/activity/{}", id), Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["id"], id.as_str());
    assert_eq!(record["predicted_extent"], 2000.0);

    let (status, body) = send(&app, get_with_token(&format!("/activity/{}", id), Some(OTHER_TOKEN))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_activity_requires_auth() {
    let (app, _state) = setup_test_app().await;

    let (status, _) = send(&app, get_with_token("/activity", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_store_failure_still_returns_prediction() {
    let (app, state) = setup_app_with(&Season::ALL, Arc::new(FailingStore)).await;

    let (status, body) = send(&app, post_json("/production/predict", Some(TOKEN), yala_payload())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predicted_production"], 8000.0);
    assert!(body["record_id"].is_null());

    let health = state.health_registry.health().await;
    assert_eq!(
        health.components[components::STORE].status,
        harvest_lib::ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_healthz_and_readyz() {
    let (app, state) = setup_test_app().await;

    let (status, body) = send(&app, get_with_token("/healthz", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["components"]["model_registry"].is_object());

    let (status, body) = send(&app, get_with_token("/readyz", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);

    state
        .health_registry
        .mark_ready(state.pipeline.registry().seasons())
        .await;

    let (status, body) = send(&app, get_with_token("/readyz", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seasons"], json!(["Maha", "Yala"]));
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app().await;

    send(&app, post_json("/predict/", None, yala_payload())).await;

    let response = app
        .oneshot(get_with_token("/metrics", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("harvest_predictions_total"));
    assert!(metrics_text.contains("harvest_prediction_latency_seconds_bucket"));
}

#[tokio::test]
async fn test_malformed_activity_limit_rejected() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = send(&app, get_with_token("/activity?limit=abc", Some(TOKEN))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_query");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_fallback_state_reports_loaded_models() {
    let config = harvest_api::config::ServiceConfig {
        fallback_models: true,
        ..Default::default()
    };
    let logger = harvest_lib::StructuredLogger::new("harvest-api-test");

    let state = harvest_api::build_state(&config, HealthRegistry::new(), &logger)
        .await
        .unwrap();
    let app = create_router(Arc::new(state), CorsLayer::permissive());

    let (status, body) = send(&app, get_with_token("/readyz", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seasons"], json!(["Maha", "Yala"]));

    let (_, body) = send(&app, get_with_token("/healthz", None)).await;
    assert_eq!(body["components"]["model_registry"]["status"], "degraded");

    let response = app
        .oneshot(get_with_token("/metrics", None))
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();
    let loaded: Vec<&str> = metrics_text
        .lines()
        .filter(|l| l.starts_with("harvest_models_loaded{"))
        .collect();
    assert!(loaded
        .iter()
        .any(|l| l.contains("role=\"extent\"") && l.contains("season=\"Yala\"")));
    assert!(loaded
        .iter()
        .any(|l| l.contains("role=\"production\"") && l.contains("season=\"Maha\"")));
}
