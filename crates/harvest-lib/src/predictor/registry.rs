//! Per-season model registry
//!
//! Built once at startup and shared read-only across requests. A season is
//! either fully loaded with every role it needs, or absent.

use super::inference::{LinearRegressor, OnnxRegressor};
use super::Regressor;
use crate::error::PredictionError;
use crate::models::{ModelRole, Season};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Regressors for one season, keyed by role
#[derive(Clone)]
pub struct SeasonModels {
    season: Season,
    regressors: HashMap<ModelRole, Arc<dyn Regressor>>,
}

impl SeasonModels {
    pub fn season(&self) -> Season {
        self.season
    }

    pub fn get(&self, role: ModelRole) -> Option<&dyn Regressor> {
        self.regressors.get(&role).map(|r| r.as_ref())
    }

    /// Fetch a role the season's branch depends on
    pub fn require(&self, role: ModelRole) -> Result<&dyn Regressor, PredictionError> {
        self.get(role)
            .ok_or(PredictionError::UnsupportedSeason(self.season))
    }

    pub fn roles(&self) -> impl Iterator<Item = ModelRole> + '_ {
        self.regressors.keys().copied()
    }
}

impl std::fmt::Debug for SeasonModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self
            .regressors
            .iter()
            .map(|(role, r)| format!("{}={}", role, r.name()))
            .collect();
        names.sort();
        f.debug_struct("SeasonModels")
            .field("season", &self.season)
            .field("regressors", &names)
            .finish()
    }
}

/// Process-wide, immutable model registry
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    seasons: HashMap<Season, SeasonModels>,
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    /// Artifact path for a (season, role) pair, e.g. `model_extent(Yala).onnx`
    pub fn artifact_path(model_dir: &Path, season: Season, role: ModelRole) -> PathBuf {
        model_dir.join(format!("model_{}({}).onnx", role, season))
    }

    /// Load every required artifact for `seasons` from `model_dir`.
    ///
    /// The first failure aborts the whole load.
    pub fn load(model_dir: &Path, seasons: &[Season]) -> Result<Self, PredictionError> {
        let mut builder = Self::builder();

        for &season in seasons {
            for &role in season.required_roles() {
                let path = Self::artifact_path(model_dir, season, role);
                let regressor = OnnxRegressor::from_file(&path).map_err(|e| {
                    PredictionError::ModelLoadFailure {
                        season,
                        role,
                        reason: format!("{}: {:#}", path.display(), e),
                    }
                })?;
                info!(season = %season, role = %role, path = %path.display(), "Loaded model");
                builder = builder.insert(season, role, Arc::new(regressor));
            }
        }

        builder.build()
    }

    /// Heuristic linear regressors for running without artifacts.
    pub fn fallback(seasons: &[Season]) -> Result<Self, PredictionError> {
        let mut builder = Self::builder();
        for &season in seasons {
            warn!(season = %season, "Using fallback regressors instead of trained models");
            builder = match season {
                Season::Yala => builder
                    .insert(
                        season,
                        ModelRole::Extent,
                        Arc::new(LinearRegressor::scale_area("fallback_extent(Yala)", 0.95)),
                    )
                    .insert(
                        season,
                        ModelRole::Production,
                        Arc::new(LinearRegressor::scale_area("fallback_production(Yala)", 4.0)),
                    ),
                Season::Maha => builder.insert(
                    season,
                    ModelRole::Production,
                    Arc::new(LinearRegressor::new(
                        "fallback_production(Maha)",
                        0.0,
                        [0.0, 0.0, 0.0, 2.0, 0.5],
                    )),
                ),
            };
        }
        builder.build()
    }

    /// Models for a season, or `UnsupportedSeason` if none were loaded
    pub fn get_models(&self, season: Season) -> Result<&SeasonModels, PredictionError> {
        self.seasons
            .get(&season)
            .ok_or(PredictionError::UnsupportedSeason(season))
    }

    /// Loaded seasons in code order
    pub fn seasons(&self) -> Vec<Season> {
        let mut seasons: Vec<_> = self.seasons.keys().copied().collect();
        seasons.sort();
        seasons
    }

    pub fn is_empty(&self) -> bool {
        self.seasons.is_empty()
    }
}

/// Collects regressors and validates completeness on `build`
#[derive(Default)]
pub struct ModelRegistryBuilder {
    regressors: HashMap<Season, HashMap<ModelRole, Arc<dyn Regressor>>>,
}

impl ModelRegistryBuilder {
    pub fn insert(mut self, season: Season, role: ModelRole, regressor: Arc<dyn Regressor>) -> Self {
        self.regressors
            .entry(season)
            .or_default()
            .insert(role, regressor);
        self
    }

    /// Fails if any season is missing one of its required roles
    pub fn build(self) -> Result<ModelRegistry, PredictionError> {
        let mut seasons = HashMap::with_capacity(self.regressors.len());

        for (season, regressors) in self.regressors {
            if let Some(&role) = season
                .required_roles()
                .iter()
                .find(|role| !regressors.contains_key(role))
            {
                return Err(PredictionError::ModelLoadFailure {
                    season,
                    role,
                    reason: "no regressor provided".to_string(),
                });
            }
            seasons.insert(season, SeasonModels { season, regressors });
        }

        Ok(ModelRegistry { seasons })
    }
}
