//! Prediction output formatting
//!
//! Converts raw regressor outputs into a `PredictionResult` rounded to the
//! precision returned to callers.

use crate::models::PredictionResult;

/// Decimal places kept in returned predictions
pub const OUTPUT_DECIMALS: i32 = 2;

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Formats raw model outputs into a `PredictionResult`
#[derive(Debug, Clone)]
pub struct OutputFormatter {
    decimals: i32,
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self {
            decimals: OUTPUT_DECIMALS,
        }
    }

    /// Round both outputs. An absent extent stays absent.
    pub fn format(&self, extent: Option<f64>, production: f64) -> PredictionResult {
        PredictionResult {
            predicted_extent: extent.map(|e| round_to(e, self.decimals)),
            predicted_production: round_to(production, self.decimals),
        }
    }
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self::new()
    }
}
