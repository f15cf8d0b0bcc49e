//! Axum REST API handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post, delete},
    extract::{Path, State, Multipart, Query, DefaultBodyLimit},
    extract::multipart::MultipartRejection,
    http::StatusCode,
    response::Json,
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use uuid::Uuid;

use crate::service::{ClassifierService, ClassifyError, Prediction};
use crate::storage::{PredictionRecord, PredictionStore};
use crate::utils::upload::{is_allowed_file, sanitize_filename};

use super::dto::*;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: &str, code: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message, code)))
}

/// Application state shared across handlers
pub struct AppState<S: PredictionStore> {
    pub service: Arc<ClassifierService>,
    /// `None` when prediction history is disabled
    pub storage: Option<Arc<S>>,
    pub start_time: Instant,
}

/// Create the REST API router
pub fn create_rest_router<S: PredictionStore>(state: Arc<AppState<S>>) -> Router {
    let max_upload = state.service.config().server.max_upload_bytes;

    Router::new()
        // Classification
        .route("/api/predict", post(predict_handler::<S>))
        .route("/api/classes", get(classes_handler::<S>))
        .route("/api/models", get(models_handler::<S>))
        .route("/api/metrics", get(all_metrics_handler::<S>))
        .route("/api/metrics/:model", get(metrics_handler::<S>))
        // Prediction history
        .route("/api/history", get(history_handler::<S>).delete(delete_all_history_handler::<S>))
        .route("/api/history/:id", delete(delete_history_handler::<S>))
        // System endpoints
        .route("/health", get(health_handler::<S>))
        .route("/api/health", get(health_handler::<S>))
        // Middleware
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Record a successful prediction; failures only get logged
async fn save_prediction_record<S: PredictionStore>(
    storage: &S,
    filename: &str,
    prediction: &Prediction,
) -> Option<String> {
    let id = Uuid::new_v4().to_string();
    let scores_json = match serde_json::to_string(&prediction.all_predictions) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize scores: {}", e);
            return None;
        }
    };

    let record = PredictionRecord {
        id: id.clone(),
        model: prediction.model.to_string(),
        filename: sanitize_filename(filename),
        prediction: prediction.prediction.clone(),
        class_index: prediction.class_index as i64,
        confidence: prediction.confidence as f64,
        scores_json,
        duration_ms: prediction.inference_time_ms as i64,
        created_at: chrono::Utc::now().timestamp(),
    };

    match storage.save_prediction(&record).await {
        Ok(()) => Some(id),
        Err(e) => {
            error!("Failed to save prediction record: {}", e);
            None
        }
    }
}

/// Classify an uploaded image
async fn predict_handler<S: PredictionStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<PredictQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    // Anything that is not a multipart form carries no file
    let mut multipart = multipart.map_err(|e| {
        warn!("Rejected non-multipart upload: {}", e);
        api_error(StatusCode::BAD_REQUEST, "No file uploaded", "NO_FILE")
    })?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut model = query.model;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        api_error(e.status(), &e.body_text(), "MULTIPART_ERROR")
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field.bytes().await.map_err(|e| {
                    api_error(e.status(), &e.body_text(), "READ_ERROR")
                })?;
                upload = Some((filename, data.to_vec()));
            }
            "model" => {
                let text = field.text().await.map_err(|e| {
                    api_error(e.status(), &e.body_text(), "READ_ERROR")
                })?;
                if !text.trim().is_empty() {
                    model = Some(text);
                }
            }
            _ => {}
        }
    }

    let (filename, image_data) = upload.ok_or_else(|| {
        api_error(StatusCode::BAD_REQUEST, "No file uploaded", "NO_FILE")
    })?;

    if filename.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No file selected", "NO_FILE_SELECTED"));
    }

    let allowed = &state.service.config().upload.allowed_extensions;
    if !is_allowed_file(&filename, allowed) {
        let message = format!("Invalid file type. Allowed: {}", allowed.join(", "));
        return Err(api_error(StatusCode::BAD_REQUEST, &message, "INVALID_FILE_TYPE"));
    }

    if image_data.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Uploaded file is empty", "EMPTY_FILE"));
    }

    let prediction = state
        .service
        .predict(&image_data, model.as_deref())
        .await
        .map_err(classify_error_response)?;

    let record_id = match &state.storage {
        Some(storage) => save_prediction_record(storage.as_ref(), &filename, &prediction).await,
        None => None,
    };

    let mut response = PredictResponse::from(prediction);
    response.record_id = record_id;
    Ok(Json(response))
}

fn classify_error_response(err: ClassifyError) -> ApiError {
    if err.is_client_error() {
        warn!("Rejected prediction request: {}", err);
    }

    match &err {
        ClassifyError::UnknownModel(msg) => {
            api_error(StatusCode::BAD_REQUEST, msg, "UNKNOWN_MODEL")
        }
        ClassifyError::InvalidImage(_) => {
            api_error(StatusCode::BAD_REQUEST, &err.to_string(), "INVALID_IMAGE")
        }
        ClassifyError::ModelUnavailable(_) => {
            warn!("Prediction rejected: {}", err);
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                &format!("Prediction failed: {}", err),
                "MODEL_UNAVAILABLE",
            )
        }
        ClassifyError::OutputMismatch { .. } | ClassifyError::Inference(_) => {
            error!("Prediction error: {:#}", err);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Prediction failed: {}", err),
                "PREDICTION_FAILED",
            )
        }
    }
}

/// Ordered class names
async fn classes_handler<S: PredictionStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<ClassesResponse> {
    Json(ClassesResponse {
        classes: state.service.classes().to_vec(),
    })
}

/// Model availability
async fn models_handler<S: PredictionStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.service.models(),
        default_model: state.service.config().inference.default_model,
    })
}

/// Stored metrics for every model
async fn all_metrics_handler<S: PredictionStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<AllMetricsResponse> {
    Json(AllMetricsResponse {
        metrics: state.service.all_metrics().await,
    })
}

/// Stored metrics for one model
async fn metrics_handler<S: PredictionStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(model): Path<String>,
) -> Result<Json<MetricsResponse>, ApiError> {
    let kind = state.service.resolve_model(Some(&model)).map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, &e.to_string(), "UNKNOWN_MODEL")
    })?;

    let metrics = state.service.metrics(&model).await.map_err(|e| {
        error!("Failed to load metrics for {}: {:#}", kind, e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), "METRICS_FAILED")
    })?;

    match metrics {
        Some(metrics) => Ok(Json(MetricsResponse { model: kind, metrics })),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            &format!("No metrics stored for {}", kind),
            "NOT_FOUND",
        )),
    }
}

fn history_storage<S: PredictionStore>(state: &AppState<S>) -> Result<&Arc<S>, ApiError> {
    state.storage.as_ref().ok_or_else(|| {
        api_error(StatusCode::NOT_FOUND, "Prediction history is disabled", "HISTORY_DISABLED")
    })
}

/// Recent predictions
async fn history_handler<S: PredictionStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let storage = history_storage(&state)?;
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let model = match query.model.as_deref().filter(|m| !m.is_empty() && *m != "all") {
        Some(m) => Some(
            state
                .service
                .resolve_model(Some(m))
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, &e.to_string(), "UNKNOWN_MODEL"))?
                .to_string(),
        ),
        None => None,
    };

    let records = storage.list_predictions(limit, model.as_deref()).await.map_err(|e| {
        error!("Failed to list predictions: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), "LIST_FAILED")
    })?;
    let total = storage.count_predictions(model.as_deref()).await.map_err(|e| {
        error!("Failed to count predictions: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), "LIST_FAILED")
    })?;

    Ok(Json(HistoryResponse {
        predictions: records.into_iter().map(PredictionRecordDto::from).collect(),
        total,
        limit,
    }))
}

/// Delete a single prediction record
async fn delete_history_handler<S: PredictionStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let storage = history_storage(&state)?;
    let deleted = storage.delete_prediction(&id).await.map_err(|e| {
        error!("Failed to delete prediction: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), "DELETE_FAILED")
    })?;

    if deleted {
        Ok(Json(DeleteResponse {
            success: true,
            message: "Prediction deleted successfully".to_string(),
            count: 1,
        }))
    } else {
        Err(api_error(StatusCode::NOT_FOUND, "Prediction not found", "NOT_FOUND"))
    }
}

/// Delete all prediction records
async fn delete_all_history_handler<S: PredictionStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let storage = history_storage(&state)?;
    let count = storage.delete_all_predictions().await.map_err(|e| {
        error!("Failed to delete all predictions: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), "DELETE_FAILED")
    })?;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Deleted {} predictions", count),
        count,
    }))
}

/// Health check
async fn health_handler<S: PredictionStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let health = state.service.health();

    Json(HealthResponse {
        status: if health.healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: health.version,
        model_loaded: health.models_loaded.values().any(|loaded| *loaded),
        models_loaded: health.models_loaded,
        default_model: health.default_model,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: health.timestamp,
    })
}
