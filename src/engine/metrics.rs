//! Stored evaluation metrics
//!
//! Training runs drop a JSON report per model (accuracy, per-class
//! precision/recall, confusion matrix, ...). The service only serves them;
//! their shape is whatever the training pipeline wrote.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use super::model::ModelKind;

/// Reads per-model metrics reports from a directory
#[derive(Debug, Clone)]
pub struct MetricsStore {
    dir: PathBuf,
}

impl MetricsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidates(&self, kind: ModelKind) -> [PathBuf; 2] {
        [
            self.dir.join(format!("{}.json", kind)),
            self.dir.join(format!("{}_metrics.json", kind)),
        ]
    }

    /// Metrics for one model, `None` when no report is stored
    pub async fn load(&self, kind: ModelKind) -> Result<Option<Value>> {
        for path in self.candidates(kind) {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    let value = serde_json::from_str(&content)
                        .with_context(|| format!("Invalid metrics file {}", path.display()))?;
                    return Ok(Some(value));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", path.display()))
                }
            }
        }
        Ok(None)
    }

    /// Metrics for every model that has a readable report
    pub async fn load_all(&self) -> BTreeMap<String, Value> {
        let mut all = BTreeMap::new();
        for kind in ModelKind::ALL {
            match self.load(kind).await {
                Ok(Some(value)) => {
                    all.insert(kind.to_string(), value);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping metrics for {}: {:#}", kind, e),
            }
        }
        all
    }
}
