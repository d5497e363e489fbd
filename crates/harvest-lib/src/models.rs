//! Core data models for the harvest predictor

use crate::error::PredictionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Agricultural season. The discriminant is the code baked into the models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Season {
    Maha,
    Yala,
}

impl Season {
    pub const ALL: [Season; 2] = [Season::Maha, Season::Yala];

    /// Parse an exact season label ("Maha" or "Yala")
    pub fn from_label(label: &str) -> Result<Self, PredictionError> {
        match label {
            "Maha" => Ok(Season::Maha),
            "Yala" => Ok(Season::Yala),
            other => Err(PredictionError::InvalidSeason(other.to_string())),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Season::Maha => "Maha",
            Season::Yala => "Yala",
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Season::Maha => 0,
            Season::Yala => 1,
        }
    }

    /// Model roles that must be loaded before this season can serve requests
    pub fn required_roles(&self) -> &'static [ModelRole] {
        match self {
            Season::Yala => &[ModelRole::Extent, ModelRole::Production],
            Season::Maha => &[ModelRole::Production],
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Season {
    type Err = PredictionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Season::from_label(s)
    }
}

/// Role a regressor plays within a season's prediction path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Extent,
    Production,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Extent => "extent",
            ModelRole::Production => "production",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw prediction input as supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub year: i32,
    pub season: String,
    pub district: String,
    pub sown_hect: f64,
    pub previous_yield: f64,
    /// Required for Maha only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_production: Option<f64>,
}

/// Numeric feature vector in the column order the models were trained on:
/// `[Year, Season_encoded, District_encoded, <area>, <history>]`.
///
/// `area_hect` is sown area for the first stage and harvested extent for the
/// Yala production stage. `history` is the previous yield (Yala) or the
/// previous production (Maha).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub year: f64,
    pub season_code: f64,
    pub district_code: f64,
    pub area_hect: f64,
    pub history: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; 5] {
        [
            self.year,
            self.season_code,
            self.district_code,
            self.area_hect,
            self.history,
        ]
    }
}

/// Pipeline output, rounded to two decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// `None` when the season does not predict extent (Maha)
    pub predicted_extent: Option<f64>,
    pub predicted_production: f64,
}

/// Verified caller identity (the token subject)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uid: String,
}

impl UserIdentity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

pub type RecordId = String;

/// A persisted prediction together with its inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: RecordId,
    pub user_id: String,
    pub season: String,
    pub district: String,
    pub year: i32,
    pub sown_hect: f64,
    pub previous_yield: f64,
    pub previous_production: Option<f64>,
    pub predicted_extent: Option<f64>,
    pub predicted_production: f64,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn new(
        id: RecordId,
        user: &UserIdentity,
        request: &PredictionRequest,
        result: &PredictionResult,
    ) -> Self {
        Self {
            id,
            user_id: user.uid.clone(),
            season: request.season.clone(),
            district: request.district.to_uppercase(),
            year: request.year,
            sown_hect: request.sown_hect,
            previous_yield: request.previous_yield,
            previous_production: request.previous_production,
            predicted_extent: result.predicted_extent,
            predicted_production: result.predicted_production,
            created_at: Utc::now(),
        }
    }
}
