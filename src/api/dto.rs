//! REST API request/response data transfer objects

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::ModelKind;
use crate::service::{ModelInfo, Prediction};
use crate::storage::PredictionRecord;

/// Predict query string (`?model=cnn`)
#[derive(Debug, Default, Deserialize)]
pub struct PredictQuery {
    pub model: Option<String>,
}

/// Predict response
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: String,
    pub confidence: f32,
    pub class_index: usize,
    pub model: ModelKind,
    pub timestamp: String,
    pub inference_time_ms: u64,
    pub all_predictions: BTreeMap<String, f32>,
    /// History record, when history is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

impl From<Prediction> for PredictResponse {
    fn from(p: Prediction) -> Self {
        Self {
            prediction: p.prediction,
            confidence: p.confidence,
            class_index: p.class_index,
            model: p.model,
            timestamp: p.timestamp,
            inference_time_ms: p.inference_time_ms,
            all_predictions: p.all_predictions,
            record_id: None,
        }
    }
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// True when at least one model is in memory
    pub model_loaded: bool,
    pub models_loaded: BTreeMap<String, bool>,
    pub default_model: ModelKind,
    pub uptime_seconds: u64,
    pub timestamp: String,
}

/// Class names response
#[derive(Debug, Serialize, Deserialize)]
pub struct ClassesResponse {
    pub classes: Vec<String>,
}

/// Model availability response
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub default_model: ModelKind,
}

/// One model's stored metrics
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub model: ModelKind,
    pub metrics: serde_json::Value,
}

/// All stored metrics
#[derive(Debug, Serialize, Deserialize)]
pub struct AllMetricsResponse {
    pub metrics: BTreeMap<String, serde_json::Value>,
}

/// Query parameters for history listing
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub model: Option<String>,
}

/// History record DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionRecordDto {
    pub id: String,
    pub model: String,
    pub filename: String,
    pub prediction: String,
    pub class_index: i64,
    pub confidence: f64,
    pub all_predictions: serde_json::Value,
    pub duration_ms: i64,
    pub created_at: i64,
}

impl From<PredictionRecord> for PredictionRecordDto {
    fn from(r: PredictionRecord) -> Self {
        Self {
            id: r.id,
            model: r.model,
            filename: r.filename,
            prediction: r.prediction,
            class_index: r.class_index,
            confidence: r.confidence,
            all_predictions: serde_json::from_str(&r.scores_json).unwrap_or(serde_json::Value::Null),
            duration_ms: r.duration_ms,
            created_at: r.created_at,
        }
    }
}

/// History listing response
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub predictions: Vec<PredictionRecordDto>,
    pub total: i64,
    pub limit: i64,
}

/// Delete response
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub count: u64,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
        }
    }
}
