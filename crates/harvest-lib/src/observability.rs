//! Observability infrastructure for the prediction service
//!
//! Provides:
//! - Prometheus metrics (prediction latency, outcomes, persistence, loaded models)
//! - Structured JSON logging with tracing

use crate::models::{ModelRole, PredictionResult, Season};
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    prediction_latency_seconds: HistogramVec,
    predictions_total: IntCounterVec,
    prediction_errors_total: IntCounterVec,
    records_saved_total: IntCounter,
    record_save_errors_total: IntCounter,
    models_loaded: IntGaugeVec,
    slow_inferences_total: IntCounterVec,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram_vec!(
                "harvest_prediction_latency_seconds",
                "Time spent encoding inputs and running the season's models",
                &["season"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "harvest_predictions_total",
                "Successful predictions by season",
                &["season"]
            )
            .expect("Failed to register predictions_total"),

            prediction_errors_total: register_int_counter_vec!(
                "harvest_prediction_errors_total",
                "Rejected or failed predictions by reason",
                &["reason"]
            )
            .expect("Failed to register prediction_errors_total"),

            records_saved_total: register_int_counter!(
                "harvest_records_saved_total",
                "Prediction records persisted"
            )
            .expect("Failed to register records_saved_total"),

            record_save_errors_total: register_int_counter!(
                "harvest_record_save_errors_total",
                "Prediction records that failed to persist"
            )
            .expect("Failed to register record_save_errors_total"),

            models_loaded: register_int_gauge_vec!(
                "harvest_models_loaded",
                "Loaded regressors by season and role",
                &["season", "role"]
            )
            .expect("Failed to register models_loaded"),

            slow_inferences_total: register_int_counter_vec!(
                "harvest_slow_inferences_total",
                "Model invocations slower than the 5ms target",
                &["model"]
            )
            .expect("Failed to register slow_inferences_total"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    /// Record a successful prediction and its latency
    pub fn observe_prediction(&self, season: &str, duration_secs: f64) {
        let inner = self.inner();
        inner
            .prediction_latency_seconds
            .with_label_values(&[season])
            .observe(duration_secs);
        inner.predictions_total.with_label_values(&[season]).inc();
    }

    pub fn inc_prediction_errors(&self, reason: &str) {
        self.inner()
            .prediction_errors_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_records_saved(&self) {
        self.inner().records_saved_total.inc();
    }

    pub fn inc_record_save_errors(&self) {
        self.inner().record_save_errors_total.inc();
    }

    pub fn set_model_loaded(&self, season: Season, role: ModelRole) {
        self.inner()
            .models_loaded
            .with_label_values(&[season.label(), role.as_str()])
            .set(1);
    }

    pub fn inc_slow_inferences(&self, model: &str) {
        self.inner()
            .slow_inferences_total
            .with_label_values(&[model])
            .inc();
    }
}

/// Structured logger for service events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            port = port,
            "Prediction service started"
        );
    }

    pub fn log_models_loaded(&self, seasons: &[Season], fallback: bool) {
        let seasons: Vec<&str> = seasons.iter().map(|s| s.label()).collect();
        if fallback {
            warn!(
                event = "models_loaded",
                service = %self.service,
                seasons = ?seasons,
                fallback = true,
                "Serving fallback regressors, predictions are not from trained models"
            );
        } else {
            info!(
                event = "models_loaded",
                service = %self.service,
                seasons = ?seasons,
                fallback = false,
                "Model registry loaded"
            );
        }
    }

    pub fn log_prediction(
        &self,
        user_id: Option<&str>,
        season: &str,
        district: &str,
        year: i32,
        result: &PredictionResult,
    ) {
        info!(
            event = "prediction_generated",
            service = %self.service,
            user_id = ?user_id,
            season = %season,
            district = %district,
            year = year,
            predicted_extent = ?result.predicted_extent,
            predicted_production = result.predicted_production,
            "Generated harvest prediction"
        );
    }

    pub fn log_rejected(&self, season: &str, district: &str, reason: &str, message: &str) {
        warn!(
            event = "prediction_rejected",
            service = %self.service,
            season = %season,
            district = %district,
            reason = %reason,
            message = %message,
            "Prediction request rejected"
        );
    }

    pub fn log_record_saved(&self, user_id: &str, record_id: &str) {
        info!(
            event = "record_saved",
            service = %self.service,
            user_id = %user_id,
            record_id = %record_id,
            "Prediction record persisted"
        );
    }

    pub fn log_record_save_failed(&self, user_id: &str, error: &str) {
        warn!(
            event = "record_save_failed",
            service = %self.service,
            user_id = %user_id,
            error = %error,
            "Failed to persist prediction record"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Prediction service shutting down"
        );
    }
}
