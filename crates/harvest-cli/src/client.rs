//! API client for communicating with the Harvest Prediction API

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

/// Error reported by the API in its `{"error", "message"}` body
#[derive(Debug, Error)]
#[error("API error ({status}): {message} [{reason}]")]
pub struct ApiError {
    pub status: u16,
    pub reason: String,
    pub message: String,
}

/// API client for the Harvest Prediction API
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(e) => ApiError {
                    status,
                    reason: e.error,
                    message: e.message,
                }
                .into(),
                Err(_) => anyhow::anyhow!("API error ({}): {}", status, body),
            });
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a GET request, parsing the body whatever the status
    async fn get_report<T: DeserializeOwned>(&self, path: &str) -> Result<(u16, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status().as_u16();
        let body = response.json().await.context("Failed to parse response")?;
        Ok((status, body))
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Request a prediction; persisted only when a token is configured
    pub async fn predict(&self, input: &PredictionInput) -> Result<PredictionResponse> {
        let path = if self.has_token() {
            "production/predict"
        } else {
            "predict/"
        };
        self.post(path, input).await
    }

    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<ActivityRecord>> {
        let path = match limit {
            Some(limit) => format!("activity?limit={}", limit),
            None => "activity".to_string(),
        };
        self.get(&path).await
    }

    pub async fn record(&self, id: &str) -> Result<ActivityRecord> {
        self.get(&format!("activity/{}", id)).await
    }

    pub async fn health(&self) -> Result<ServiceStatus> {
        let (_, health) = self.get_report::<HealthReport>("healthz").await?;
        let (_, readiness) = self.get_report::<ReadinessReport>("readyz").await?;
        Ok(ServiceStatus { health, readiness })
    }
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionInput {
    pub year: i32,
    pub season: String,
    pub district: String,
    pub sown_hect: f64,
    pub previous_yield: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_production: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predicted_extent: Option<f64>,
    pub predicted_production: f64,
    #[serde(default)]
    pub record_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub season: String,
    pub district: String,
    pub year: i32,
    pub sown_hect: f64,
    pub previous_yield: f64,
    #[serde(default)]
    pub previous_production: Option<f64>,
    pub predicted_extent: Option<f64>,
    pub predicted_production: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: HashMap<String, ComponentReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub ready: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub seasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub health: HealthReport,
    pub readiness: ReadinessReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
