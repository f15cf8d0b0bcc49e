//! The `predict` surface every loaded artifact exposes

use std::sync::Arc;

use ndarray::Array4;
use anyhow::Result;

use crate::config::ModelConfig;
use crate::utils::math::{is_probability_vector, softmax};

use super::model::ModelKind;

/// A loaded model that maps one preprocessed batch to class scores
pub trait Classifier: Send + Sync {
    /// Forward pass. Returns the scores of the first (only) batch item.
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>>;
}

/// Builds classifiers from artifacts on disk
pub trait ModelLoader: Send + Sync {
    fn load(&self, kind: ModelKind, config: &ModelConfig) -> Result<Arc<dyn Classifier>>;
}

/// Normalize raw model output into probabilities.
///
/// Keras heads usually end in softmax already, but signatures exported
/// without the activation hand back logits.
pub fn to_probabilities(scores: Vec<f32>) -> Vec<f32> {
    if is_probability_vector(&scores, 1e-3) {
        scores
    } else {
        softmax(&scores)
    }
}
