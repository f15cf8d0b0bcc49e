//! Classification error types

use thiserror::Error;

use crate::engine::ModelNotFound;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("{0}")]
    UnknownModel(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("{0}")]
    ModelUnavailable(#[from] ModelNotFound),

    #[error("Model produced {got} scores, expected {expected} (one per class)")]
    OutputMismatch { got: usize, expected: usize },

    #[error(transparent)]
    Inference(anyhow::Error),
}

impl ClassifyError {
    /// Whether the caller sent something we cannot classify
    pub fn is_client_error(&self) -> bool {
        matches!(self, ClassifyError::UnknownModel(_) | ClassifyError::InvalidImage(_))
    }
}

impl From<anyhow::Error> for ClassifyError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ModelNotFound>() {
            Ok(not_found) => ClassifyError::ModelUnavailable(not_found),
            Err(err) => ClassifyError::Inference(err),
        }
    }
}
