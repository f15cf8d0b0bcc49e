//! Storage abstraction traits
//!
//! Defines the interface for prediction history persistence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use anyhow::Result;

/// One recorded classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Unique record ID (UUID)
    pub id: String,
    /// Model that produced the result ("cnn" / "vgg16")
    pub model: String,
    /// Sanitized upload filename
    pub filename: String,
    /// Top-1 class name
    pub prediction: String,
    pub class_index: i64,
    pub confidence: f64,
    /// Full class -> probability mapping as JSON
    pub scores_json: String,
    pub duration_ms: i64,
    /// Unix seconds
    pub created_at: i64,
}

/// Prediction history storage
/// Implementations must be thread-safe and async-compatible
#[async_trait]
pub trait PredictionStore: Send + Sync + 'static {
    /// Save a new record
    async fn save_prediction(&self, record: &PredictionRecord) -> Result<()>;

    /// Newest records first, optionally for one model only
    async fn list_predictions(&self, limit: i64, model: Option<&str>) -> Result<Vec<PredictionRecord>>;

    /// Get a record by ID
    async fn get_prediction(&self, id: &str) -> Result<Option<PredictionRecord>>;

    /// Delete a record, returns whether it existed
    async fn delete_prediction(&self, id: &str) -> Result<bool>;

    /// Delete every record, returns how many were removed
    async fn delete_all_predictions(&self) -> Result<u64>;

    /// Record count, optionally for one model only
    async fn count_predictions(&self, model: Option<&str>) -> Result<i64>;
}
