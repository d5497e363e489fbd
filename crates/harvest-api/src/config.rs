//! Service configuration

use anyhow::{Context, Result};
use harvest_lib::Season;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "HARVEST_CONFIG";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listen port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding `model_<role>(<Season>).onnx` artifacts
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Seasons to load models for; each must fully load or startup fails
    #[serde(default = "default_seasons")]
    pub seasons: Vec<String>,

    /// Serve heuristic regressors instead of loading artifacts
    #[serde(default)]
    pub fallback_models: bool,

    /// JSON snapshot file for prediction records (in-memory only if unset)
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Upper bound on a single store call
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// SHA-256 hex digest of a bearer token mapped to its user id
    #[serde(default)]
    pub auth_tokens: HashMap<String, String>,

    /// Default number of records returned by `/activity`
    #[serde(default = "default_activity_limit")]
    pub activity_limit: usize,
}

fn default_api_port() -> u16 {
    8000
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("ml_models")
}

fn default_seasons() -> Vec<String> {
    vec!["Yala".to_string(), "Maha".to_string()]
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_activity_limit() -> usize {
    5
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            model_dir: default_model_dir(),
            seasons: default_seasons(),
            fallback_models: false,
            store_path: None,
            store_timeout_ms: default_store_timeout_ms(),
            cors_origins: Vec::new(),
            auth_tokens: HashMap::new(),
            activity_limit: default_activity_limit(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from an optional file and `HARVEST_*` environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("HARVEST")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("seasons")
                    .with_list_parse_key("cors_origins")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let config: ServiceConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.parsed_seasons()?;
        Ok(config)
    }

    /// Configured seasons, validated and deduplicated
    pub fn parsed_seasons(&self) -> Result<Vec<Season>> {
        let mut seasons = Vec::with_capacity(self.seasons.len());
        for label in &self.seasons {
            let season = Season::from_label(label.trim())
                .with_context(|| format!("Invalid season '{}' in configuration", label))?;
            if !seasons.contains(&season) {
                seasons.push(season);
            }
        }
        if seasons.is_empty() {
            anyhow::bail!("At least one season must be configured");
        }
        seasons.sort();
        Ok(seasons)
    }
}
