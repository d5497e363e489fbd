//! Feature encoding for ML inference
//!
//! Maps human-readable season and district labels to the numeric codes the
//! pretrained models expect, and assembles the per-stage feature vectors.

use crate::error::PredictionError;
use crate::models::{FeatureVector, Season};

/// Number of input features expected by every model
pub const NUM_FEATURES: usize = 5;

/// Canonical district list. Position is the encoded index used at training
/// time, so the order must never change.
pub const DISTRICTS: [&str; 24] = [
    "AMPARA",
    "ANURADHAPURA",
    "BADULLA",
    "BATTICALOA",
    "COLOMBO",
    "GALLE",
    "GAMPAHA",
    "HAMBANTOTA",
    "JAFFNA",
    "KALUTARA",
    "KANDY",
    "KEGALLE",
    "KILINOCHCHI",
    "KURUNEGALA",
    "MANNAR",
    "MATALE",
    "MONARAGALA",
    "MULLAITIVU",
    "NUWARA ELIYA",
    "POLONNARUWA",
    "PUTTALAM",
    "RATNAPURA",
    "TRINCOMALEE",
    "VAVUNIYA",
];

/// Validated, encoded categorical inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedInput {
    pub season: Season,
    pub season_code: u8,
    pub district_code: u8,
}

impl EncodedInput {
    /// Build a feature vector for one model stage
    pub fn features(&self, year: i32, area_hect: f64, history: f64) -> FeatureVector {
        FeatureVector {
            year: year as f64,
            season_code: self.season_code as f64,
            district_code: self.district_code as f64,
            area_hect,
            history,
        }
    }
}

/// Look up a district's index, ignoring case
pub fn district_code(district: &str) -> Option<u8> {
    let upper = district.to_uppercase();
    DISTRICTS
        .iter()
        .position(|name| *name == upper)
        .map(|idx| idx as u8)
}

/// Canonical name for an encoded district index
pub fn district_name(code: u8) -> Option<&'static str> {
    DISTRICTS.get(code as usize).copied()
}

/// Validate and encode a season/district pair.
///
/// Season labels are matched exactly; districts case-insensitively.
pub fn encode(season: &str, district: &str) -> Result<EncodedInput, PredictionError> {
    let season = Season::from_label(season)?;
    let district_code = district_code(district)
        .ok_or_else(|| PredictionError::UnknownDistrict(district.to_string()))?;

    Ok(EncodedInput {
        season,
        season_code: season.code(),
        district_code,
    })
}
