//! Storage module for prediction history

pub mod traits;
pub mod sqlite;

pub use traits::{PredictionStore, PredictionRecord};
pub use sqlite::SqliteStorage;
