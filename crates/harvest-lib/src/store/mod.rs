//! Prediction record persistence
//!
//! The HTTP layer hands finished predictions to a `PredictionStore` after the
//! pipeline returns. The pipeline itself never touches storage.

mod memory;

pub use memory::MemoryStore;

use crate::models::{PredictionRecord, PredictionRequest, PredictionResult, RecordId, UserIdentity};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize records: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage for prediction records, scoped per user
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Persist a prediction and return its id
    async fn save(
        &self,
        user: &UserIdentity,
        request: &PredictionRequest,
        result: &PredictionResult,
    ) -> Result<RecordId, StoreError>;

    /// The user's most recent records, newest first
    async fn list(&self, user: &UserIdentity, limit: usize) -> Result<Vec<PredictionRecord>, StoreError>;

    /// A single record owned by the user
    async fn get(&self, user: &UserIdentity, id: &str) -> Result<PredictionRecord, StoreError>;
}
