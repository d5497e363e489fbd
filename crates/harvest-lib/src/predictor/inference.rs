//! ONNX inference using tract
//!
//! Each pretrained regressor is an ONNX graph taking a `[1, NUM_FEATURES]`
//! float tensor and producing a single scalar.

use super::features::NUM_FEATURES;
use super::Regressor;
use crate::models::FeatureVector;
use crate::observability::ServiceMetrics;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Maximum inference latency before warning (5ms target)
const MAX_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-based regressor using tract for lightweight inference
pub struct OnnxRegressor {
    name: String,
    model: TractModel,
    metrics: ServiceMetrics,
}

impl OnnxRegressor {
    /// Create a regressor from model bytes
    pub fn from_bytes(name: impl Into<String>, model_bytes: &[u8]) -> Result<Self> {
        let model = Self::load_model(model_bytes)?;
        Ok(Self {
            name: name.into(),
            model,
            metrics: ServiceMetrics::new(),
        })
    }

    /// Create a regressor from an artifact on disk, named after the file stem
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read model file {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(name, &bytes)
    }

    /// Load and optimize an ONNX model from bytes
    fn load_model(model_bytes: &[u8]) -> Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, NUM_FEATURES]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    fn features_to_tensor(features: &FeatureVector) -> Result<Tensor> {
        let data: Vec<f32> = features.to_array().iter().map(|v| *v as f32).collect();
        let array = tract_ndarray::Array2::from_shape_vec((1, NUM_FEATURES), data)
            .context("Failed to shape input tensor")?;
        Ok(array.into())
    }

}

impl Regressor for OnnxRegressor {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let start = Instant::now();

        let input = Self::features_to_tensor(features)?;
        let result = self.model.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        let output = output
            .cast_to::<f32>()
            .context("Model output is not numeric")?;
        let value = output
            .as_slice::<f32>()?
            .first()
            .copied()
            .context("Model output is empty")?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            self.metrics.inc_slow_inferences(&self.name);
            warn!(model = %self.name, elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
        } else {
            debug!(model = %self.name, elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Ok(value as f64)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Linear model over the feature vector: `intercept + Σ coefᵢ·xᵢ`.
///
/// Serves as the fallback when running without artifacts and as a
/// deterministic stand-in for tests.
#[derive(Debug, Clone)]
pub struct LinearRegressor {
    name: String,
    intercept: f64,
    coefficients: [f64; NUM_FEATURES],
}

impl LinearRegressor {
    pub fn new(name: impl Into<String>, intercept: f64, coefficients: [f64; NUM_FEATURES]) -> Self {
        Self {
            name: name.into(),
            intercept,
            coefficients,
        }
    }

    /// Always predicts `value`
    pub fn constant(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, [0.0; NUM_FEATURES])
    }

    /// Predicts `factor` times the area column
    pub fn scale_area(name: impl Into<String>, factor: f64) -> Self {
        Self::new(name, 0.0, [0.0, 0.0, 0.0, factor, 0.0])
    }
}

impl Regressor for LinearRegressor {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let x = features.to_array();
        Ok(self.intercept
            + self
                .coefficients
                .iter()
                .zip(x.iter())
                .map(|(c, v)| c * v)
                .sum::<f64>())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
