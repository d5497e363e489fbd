//! Core library for paddy harvest prediction
//!
//! This crate provides:
//! - Season/district feature encoding
//! - A per-season registry of pretrained ONNX regressors
//! - The prediction pipeline chaining those regressors
//! - Prediction record storage and bearer token verification
//! - Health checks and observability

pub mod auth;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod store;

pub use error::PredictionError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
