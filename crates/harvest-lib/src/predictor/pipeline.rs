//! Season-dispatched prediction pipeline
//!
//! Yala chains two models: the extent prediction becomes the area column of
//! the production stage. Maha predicts production directly and has no extent.

use super::features::{encode, EncodedInput};
use super::output::OutputFormatter;
use super::registry::ModelRegistry;
use super::Regressor;
use crate::error::PredictionError;
use crate::models::{FeatureVector, ModelRole, PredictionRequest, PredictionResult, Season};
use crate::observability::ServiceMetrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Orchestrates encoding, model lookup and chaining for one request at a time
#[derive(Clone)]
pub struct PredictionPipeline {
    registry: Arc<ModelRegistry>,
    formatter: OutputFormatter,
    metrics: ServiceMetrics,
}

impl PredictionPipeline {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            formatter: OutputFormatter::new(),
            metrics: ServiceMetrics::new(),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Validate, encode and predict.
    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult, PredictionError> {
        let start = Instant::now();
        let outcome = self.run(request);

        match &outcome {
            Ok(_) => self
                .metrics
                .observe_prediction(&request.season, start.elapsed().as_secs_f64()),
            Err(e) => self.metrics.inc_prediction_errors(e.reason()),
        }

        outcome
    }

    fn run(&self, request: &PredictionRequest) -> Result<PredictionResult, PredictionError> {
        validate_numeric(request)?;
        let encoded = encode(&request.season, &request.district)?;

        match encoded.season {
            Season::Yala => self.predict_yala(&encoded, request),
            Season::Maha => {
                let previous_production = request
                    .previous_production
                    .ok_or(PredictionError::MissingField("previous_production"))?;
                self.predict_maha(&encoded, request, previous_production)
            }
        }
    }

    fn predict_yala(
        &self,
        encoded: &EncodedInput,
        request: &PredictionRequest,
    ) -> Result<PredictionResult, PredictionError> {
        let models = self.registry.get_models(Season::Yala)?;
        let extent_model = models.require(ModelRole::Extent)?;
        let production_model = models.require(ModelRole::Production)?;

        let extent_input = encoded.features(request.year, request.sown_hect, request.previous_yield);
        let extent = infer(extent_model, &extent_input)?;

        // Full-precision extent feeds the second stage; only the returned value is rounded.
        let production_input = encoded.features(request.year, extent, request.previous_yield);
        let production = infer(production_model, &production_input)?;

        debug!(season = "Yala", extent, production, "Two-stage prediction completed");
        Ok(self.formatter.format(Some(extent), production))
    }

    fn predict_maha(
        &self,
        encoded: &EncodedInput,
        request: &PredictionRequest,
        previous_production: f64,
    ) -> Result<PredictionResult, PredictionError> {
        let models = self.registry.get_models(Season::Maha)?;
        let production_model = models.require(ModelRole::Production)?;

        let production_input =
            encoded.features(request.year, request.sown_hect, previous_production);
        let production = infer(production_model, &production_input)?;

        debug!(season = "Maha", production, "Direct production prediction completed");
        Ok(self.formatter.format(None, production))
    }
}

fn infer(regressor: &dyn Regressor, features: &FeatureVector) -> Result<f64, PredictionError> {
    let value = regressor
        .predict(features)
        .map_err(|e| PredictionError::Inference {
            model: regressor.name().to_string(),
            reason: format!("{:#}", e),
        })?;

    if !value.is_finite() {
        return Err(PredictionError::Inference {
            model: regressor.name().to_string(),
            reason: format!("non-finite output {}", value),
        });
    }
    Ok(value)
}

fn validate_numeric(request: &PredictionRequest) -> Result<(), PredictionError> {
    check_non_negative("sown_hect", request.sown_hect)?;
    check_non_negative("previous_yield", request.previous_yield)?;
    if let Some(previous_production) = request.previous_production {
        check_non_negative("previous_production", previous_production)?;
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), PredictionError> {
    if !value.is_finite() {
        return Err(PredictionError::InvalidInput {
            field,
            reason: "must be a finite number".to_string(),
        });
    }
    if value < 0.0 {
        return Err(PredictionError::InvalidInput {
            field,
            reason: format!("must be >= 0, got {}", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::LinearRegressor;
    use std::sync::Mutex;

    /// Records every feature vector it sees
    struct RecordingRegressor {
        inner: LinearRegressor,
        seen: Mutex<Vec<FeatureVector>>,
    }

    impl RecordingRegressor {
        fn new(inner: LinearRegressor) -> Self {
            Self {
                inner,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Regressor for RecordingRegressor {
        fn predict(&self, features: &FeatureVector) -> anyhow::Result<f64> {
            self.seen.lock().unwrap().push(*features);
            self.inner.predict(features)
        }

        fn name(&self) -> &str {
            self.inner.name()
        }
    }

    struct FailingRegressor;

    impl Regressor for FailingRegressor {
        fn predict(&self, _features: &FeatureVector) -> anyhow::Result<f64> {
            anyhow::bail!("graph execution failed")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn yala_request() -> PredictionRequest {
        PredictionRequest {
            year: 2022,
            season: "Yala".to_string(),
            district: "ANURADHAPURA".to_string(),
            sown_hect: 2500.0,
            previous_yield: 5000.0,
            previous_production: None,
        }
    }

    fn maha_request(previous_production: Option<f64>) -> PredictionRequest {
        PredictionRequest {
            year: 2022,
            season: "Maha".to_string(),
            district: "ANURADHAPURA".to_string(),
            sown_hect: 2500.0,
            previous_yield: 5000.0,
            previous_production,
        }
    }

    fn stub_registry(extent_value: f64) -> Arc<ModelRegistry> {
        Arc::new(
            ModelRegistry::builder()
                .insert(
                    Season::Yala,
                    ModelRole::Extent,
                    Arc::new(LinearRegressor::constant("extent", extent_value)),
                )
                .insert(
                    Season::Yala,
                    ModelRole::Production,
                    Arc::new(LinearRegressor::scale_area("production", 4.0)),
                )
                .insert(
                    Season::Maha,
                    ModelRole::Production,
                    Arc::new(LinearRegressor::new("maha", 0.0, [0.0, 0.0, 0.0, 1.0, 0.5])),
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_yala_chains_extent_into_production() {
        let pipeline = PredictionPipeline::new(stub_registry(2000.0));
        let result = pipeline.predict(&yala_request()).unwrap();
        assert_eq!(result.predicted_extent, Some(2000.00));
        assert_eq!(result.predicted_production, 8000.00);
    }

    #[test]
    fn test_yala_feeds_unrounded_extent() {
        let extent = Arc::new(RecordingRegressor::new(LinearRegressor::constant(
            "extent", 2000.004,
        )));
        let production = Arc::new(RecordingRegressor::new(LinearRegressor::scale_area(
            "production",
            4.0,
        )));
        let registry = ModelRegistry::builder()
            .insert(Season::Yala, ModelRole::Extent, extent.clone())
            .insert(Season::Yala, ModelRole::Production, production.clone())
            .build()
            .unwrap();
        let pipeline = PredictionPipeline::new(Arc::new(registry));

        let result = pipeline.predict(&yala_request()).unwrap();

        assert_eq!(result.predicted_extent, Some(2000.0));
        // 4 * 2000.004 = 8000.016, which would be 8000.00 had the rounded extent been used
        assert_eq!(result.predicted_production, 8000.02);

        let extent_seen = extent.seen.lock().unwrap();
        assert_eq!(extent_seen[0].to_array(), [2022.0, 1.0, 1.0, 2500.0, 5000.0]);
        let production_seen = production.seen.lock().unwrap();
        assert_eq!(production_seen[0].to_array(), [2022.0, 1.0, 1.0, 2000.004, 5000.0]);
    }

    #[test]
    fn test_maha_predicts_production_only() {
        let pipeline = PredictionPipeline::new(stub_registry(2000.0));
        let result = pipeline.predict(&maha_request(Some(6000.0))).unwrap();
        assert_eq!(result.predicted_extent, None);
        // 2500 + 0.5 * 6000
        assert_eq!(result.predicted_production, 5500.00);
    }

    #[test]
    fn test_maha_feature_vector_uses_previous_production() {
        let production = Arc::new(RecordingRegressor::new(LinearRegressor::constant("maha", 1.0)));
        let registry = ModelRegistry::builder()
            .insert(Season::Maha, ModelRole::Production, production.clone())
            .build()
            .unwrap();
        let pipeline = PredictionPipeline::new(Arc::new(registry));

        pipeline.predict(&maha_request(Some(6000.0))).unwrap();

        let seen = production.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].to_array(), [2022.0, 0.0, 1.0, 2500.0, 6000.0]);
    }

    #[test]
    fn test_maha_without_previous_production_fails() {
        let pipeline = PredictionPipeline::new(stub_registry(2000.0));
        assert!(matches!(
            pipeline.predict(&maha_request(None)),
            Err(PredictionError::MissingField("previous_production"))
        ));
    }

    #[test]
    fn test_encoder_errors_propagate() {
        let pipeline = PredictionPipeline::new(stub_registry(2000.0));

        let mut request = yala_request();
        request.season = "Summer".to_string();
        assert!(matches!(
            pipeline.predict(&request),
            Err(PredictionError::InvalidSeason(_))
        ));

        let mut request = yala_request();
        request.district = "ATLANTIS".to_string();
        assert!(matches!(
            pipeline.predict(&request),
            Err(PredictionError::UnknownDistrict(d)) if d == "ATLANTIS"
        ));
    }

    #[test]
    fn test_unsupported_season_when_not_loaded() {
        let registry = ModelRegistry::builder()
            .insert(
                Season::Maha,
                ModelRole::Production,
                Arc::new(LinearRegressor::constant("maha", 1.0)),
            )
            .build()
            .unwrap();
        let pipeline = PredictionPipeline::new(Arc::new(registry));

        assert!(matches!(
            pipeline.predict(&yala_request()),
            Err(PredictionError::UnsupportedSeason(Season::Yala))
        ));
    }

    #[test]
    fn test_negative_inputs_rejected() {
        let pipeline = PredictionPipeline::new(stub_registry(2000.0));

        let mut request = yala_request();
        request.sown_hect = -1.0;
        assert!(matches!(
            pipeline.predict(&request),
            Err(PredictionError::InvalidInput { field: "sown_hect", .. })
        ));

        assert!(matches!(
            pipeline.predict(&maha_request(Some(f64::NAN))),
            Err(PredictionError::InvalidInput { field: "previous_production", .. })
        ));
    }

    #[test]
    fn test_regressor_failure_surfaces_as_inference_error() {
        let registry = ModelRegistry::builder()
            .insert(Season::Maha, ModelRole::Production, Arc::new(FailingRegressor))
            .build()
            .unwrap();
        let pipeline = PredictionPipeline::new(Arc::new(registry));

        match pipeline.predict(&maha_request(Some(1.0))) {
            Err(PredictionError::Inference { model, reason }) => {
                assert_eq!(model, "failing");
                assert!(reason.contains("graph execution failed"));
            }
            other => panic!("expected Inference error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_output_rejected() {
        let registry = ModelRegistry::builder()
            .insert(
                Season::Maha,
                ModelRole::Production,
                Arc::new(LinearRegressor::constant("inf", f64::INFINITY)),
            )
            .build()
            .unwrap();
        let pipeline = PredictionPipeline::new(Arc::new(registry));

        assert!(matches!(
            pipeline.predict(&maha_request(Some(1.0))),
            Err(PredictionError::Inference { .. })
        ));
    }

    #[test]
    fn test_concurrent_predictions_match_sequential() {
        let pipeline = PredictionPipeline::new(stub_registry(2000.0));
        let requests: Vec<PredictionRequest> = (0..16)
            .map(|i| {
                if i % 2 == 0 {
                    let mut r = yala_request();
                    r.sown_hect = 1000.0 + i as f64;
                    r
                } else {
                    maha_request(Some(100.0 * i as f64))
                }
            })
            .collect();

        let sequential: Vec<_> = requests
            .iter()
            .map(|r| pipeline.predict(r).unwrap())
            .collect();

        let concurrent: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = requests
                .iter()
                .map(|r| {
                    let pipeline = &pipeline;
                    scope.spawn(move || pipeline.predict(r).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(sequential, concurrent);
    }
}
