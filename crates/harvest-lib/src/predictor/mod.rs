//! ML prediction engine

mod features;
mod inference;
mod output;
mod pipeline;
mod registry;

pub use features::{district_code, district_name, encode, EncodedInput, DISTRICTS, NUM_FEATURES};
pub use inference::{LinearRegressor, OnnxRegressor};
pub use output::{round_to, OutputFormatter, OUTPUT_DECIMALS};
pub use pipeline::PredictionPipeline;
pub use registry::{ModelRegistry, ModelRegistryBuilder, SeasonModels};

use crate::models::FeatureVector;
use anyhow::Result;

/// An opaque pretrained regressor: feature vector in, scalar out
pub trait Regressor: Send + Sync {
    /// Predict a single value from the features
    fn predict(&self, features: &FeatureVector) -> Result<f64>;

    /// Identifier used in logs and errors
    fn name(&self) -> &str;
}
