//! Inference engine module
//!
//! Provides OpenVINO-based classification with:
//! - Per-model image preprocessing
//! - Lazy, memoized model loading
//! - Stored evaluation metrics lookup

pub mod model;
pub mod preprocess;
pub mod classifier;
pub mod runtime;
pub mod pool;
pub mod metrics;

pub use model::ModelKind;
pub use preprocess::Preprocessor;
pub use classifier::{Classifier, ModelLoader};
pub use runtime::OpenVinoLoader;
pub use pool::{ModelPool, ModelNotFound};
pub use metrics::MetricsStore;
