//! Classifier Service - Core business logic
//!
//! Decodes an upload, preprocesses it for the requested model, runs the
//! forward pass and turns the scores into a labelled result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::engine::{
    classifier::to_probabilities,
    preprocess::decode_image,
    MetricsStore, ModelKind, ModelPool, Preprocessor,
};
use crate::utils::math::argmax;

use super::error::ClassifyError;
use super::types::*;

/// Cytology image classification service
pub struct ClassifierService {
    pool: Arc<ModelPool>,
    metrics: MetricsStore,
    config: Arc<Config>,
}

impl ClassifierService {
    pub fn new(pool: Arc<ModelPool>, metrics: MetricsStore, config: Arc<Config>) -> Self {
        Self {
            pool,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Model named in the request, or the configured default
    pub fn resolve_model(&self, name: Option<&str>) -> Result<ModelKind, ClassifyError> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name
                .parse()
                .map_err(|e: anyhow::Error| ClassifyError::UnknownModel(e.to_string())),
            None => Ok(self.config.inference.default_model),
        }
    }

    /// Classify one uploaded image
    pub async fn predict(&self, image_data: &[u8], model: Option<&str>) -> Result<Prediction, ClassifyError> {
        let start = Instant::now();
        let kind = self.resolve_model(model)?;

        let image_data = image_data.to_vec();
        let preprocessor = Preprocessor::for_model(self.config.model(kind));
        let exif_orientation = self.config.upload.exif_orientation;
        let pool = self.pool.clone();

        // Decode, resize and the forward pass are all CPU-bound
        let scores = tokio::task::spawn_blocking(move || -> Result<Vec<f32>, ClassifyError> {
            let image = decode_image(&image_data, exif_orientation)
                .map_err(|e| ClassifyError::InvalidImage(e.to_string()))?;
            let input = preprocessor.preprocess(&image);
            let model = pool.get_model(kind)?;
            Ok(model.predict(&input)?)
        })
        .await
        .map_err(|e| ClassifyError::Inference(anyhow::anyhow!("Inference task failed: {}", e)))??;

        let prediction = format_prediction(
            kind,
            &self.config.classes.names,
            to_probabilities(scores),
            start.elapsed(),
        )?;

        info!(
            "Prediction [{}]: {} (confidence: {:.2})",
            kind, prediction.prediction, prediction.confidence
        );

        Ok(prediction)
    }

    /// Get health status
    pub fn health(&self) -> HealthResult {
        let models_loaded = self
            .pool
            .get_status()
            .into_iter()
            .map(|(kind, loaded)| (kind.to_string(), loaded))
            .collect();

        HealthResult {
            healthy: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
            default_model: self.config.inference.default_model,
            models_loaded,
            timestamp: now_rfc3339(),
        }
    }

    /// Ordered class names
    pub fn classes(&self) -> &[String] {
        &self.config.classes.names
    }

    /// Availability of every configured model
    pub fn models(&self) -> Vec<ModelInfo> {
        ModelKind::ALL
            .into_iter()
            .map(|kind| {
                let config = self.config.model(kind);
                ModelInfo {
                    name: kind,
                    available: self.pool.is_available(kind),
                    loaded: self.pool.is_loaded(kind),
                    default: kind == self.config.inference.default_model,
                    path: config.path.display().to_string(),
                    input_size: config.input_size,
                    preprocessing: config.preprocessing.as_str().to_string(),
                }
            })
            .collect()
    }

    /// Stored evaluation metrics for one model
    pub async fn metrics(&self, model: &str) -> Result<Option<Value>, ClassifyError> {
        let kind = self.resolve_model(Some(model))?;
        Ok(self.metrics.load(kind).await?)
    }

    /// Stored evaluation metrics keyed by model name
    pub async fn all_metrics(&self) -> BTreeMap<String, Value> {
        self.metrics.load_all().await
    }
}

/// Turn a probability vector into the labelled response
pub fn format_prediction(
    kind: ModelKind,
    class_names: &[String],
    probabilities: Vec<f32>,
    elapsed: Duration,
) -> Result<Prediction, ClassifyError> {
    if probabilities.len() != class_names.len() {
        return Err(ClassifyError::OutputMismatch {
            got: probabilities.len(),
            expected: class_names.len(),
        });
    }

    let class_index = argmax(&probabilities).ok_or_else(|| {
        ClassifyError::Inference(anyhow::anyhow!("Model returned no usable scores"))
    })?;

    let all_predictions = class_names
        .iter()
        .cloned()
        .zip(probabilities.iter().copied())
        .collect();

    Ok(Prediction {
        model: kind,
        prediction: class_names[class_index].clone(),
        class_index,
        confidence: probabilities[class_index],
        all_predictions,
        inference_time_ms: elapsed.as_millis() as u64,
        timestamp: now_rfc3339(),
    })
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassesConfig;

    fn names() -> Vec<String> {
        ClassesConfig::default().names
    }

    #[test]
    fn test_format_prediction() {
        let result = format_prediction(
            ModelKind::Vgg16,
            &names(),
            vec![0.05, 0.10, 0.80, 0.05],
            Duration::from_millis(12),
        )
        .unwrap();

        assert_eq!(result.class_index, 2);
        assert_eq!(result.prediction, "Negative for Intraepithelial malignancy");
        assert!((result.confidence - 0.80).abs() < 1e-6);
        assert_eq!(result.all_predictions.len(), 4);
        assert!((result.all_predictions["Squamous cell carcinoma"] - 0.05).abs() < 1e-6);
        assert_eq!(result.inference_time_ms, 12);
        assert!(chrono::DateTime::parse_from_rfc3339(&result.timestamp).is_ok());
    }

    #[test]
    fn test_format_prediction_tie_takes_first() {
        let result = format_prediction(
            ModelKind::Cnn,
            &names(),
            vec![0.25, 0.25, 0.25, 0.25],
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(result.class_index, 0);
    }

    #[test]
    fn test_format_prediction_rejects_wrong_width() {
        let err = format_prediction(ModelKind::Cnn, &names(), vec![0.5, 0.5], Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, ClassifyError::OutputMismatch { got: 2, expected: 4 }));
    }
}
