//! Service layer types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::ModelKind;

/// Classification result for one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub model: ModelKind,
    /// Top-1 class name
    pub prediction: String,
    pub class_index: usize,
    /// Probability of the top-1 class
    pub confidence: f32,
    /// Every class name mapped to its probability
    pub all_predictions: BTreeMap<String, f32>,
    pub inference_time_ms: u64,
    /// RFC 3339, UTC
    pub timestamp: String,
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResult {
    pub healthy: bool,
    pub version: String,
    pub default_model: ModelKind,
    pub models_loaded: BTreeMap<String, bool>,
    pub timestamp: String,
}

/// Availability of one model artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: ModelKind,
    /// Artifact present on disk
    pub available: bool,
    /// Currently held in memory
    pub loaded: bool,
    pub default: bool,
    pub path: String,
    pub input_size: u32,
    pub preprocessing: String,
}
