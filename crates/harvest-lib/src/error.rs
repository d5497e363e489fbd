//! Error taxonomy for the prediction core

use crate::models::{ModelRole, Season};
use thiserror::Error;

/// Errors raised while validating, encoding or predicting
#[derive(Debug, Error)]
pub enum PredictionError {
    /// Season label outside the fixed vocabulary
    #[error("Invalid season '{0}'. Use 'Yala' or 'Maha'.")]
    InvalidSeason(String),

    /// District name outside the fixed vocabulary, carries the raw input
    #[error("District '{0}' not found")]
    UnknownDistrict(String),

    /// Season is valid but no models are loaded for it
    #[error("Unsupported season: {0}")]
    UnsupportedSeason(Season),

    /// Season-specific field was not supplied
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    /// Numeric input out of range
    #[error("Invalid value for '{field}': {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// Artifact could not be loaded; fatal at startup
    #[error("Failed to load {role} model for {season}: {reason}")]
    ModelLoadFailure {
        season: Season,
        role: ModelRole,
        reason: String,
    },

    /// Regressor failed or returned a non-finite value
    #[error("Inference failed in model '{model}': {reason}")]
    Inference { model: String, reason: String },
}

impl PredictionError {
    /// Stable machine-readable reason code
    pub fn reason(&self) -> &'static str {
        match self {
            PredictionError::InvalidSeason(_) => "invalid_season",
            PredictionError::UnknownDistrict(_) => "unknown_district",
            PredictionError::UnsupportedSeason(_) => "unsupported_season",
            PredictionError::MissingField(_) => "missing_field",
            PredictionError::InvalidInput { .. } => "invalid_input",
            PredictionError::ModelLoadFailure { .. } => "model_load_failure",
            PredictionError::Inference { .. } => "inference_failed",
        }
    }

    /// True for data-validation errors caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PredictionError::InvalidSeason(_)
                | PredictionError::UnknownDistrict(_)
                | PredictionError::MissingField(_)
                | PredictionError::InvalidInput { .. }
        )
    }
}
