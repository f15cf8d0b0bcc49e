//! SQLite storage implementation

use std::path::Path;

use async_trait::async_trait;
use sqlx::{sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow}, Row};
use anyhow::{Result, Context};
use tracing::{info, debug};

use super::traits::{PredictionStore, PredictionRecord};

/// SQLite-based prediction history
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database at `db_path`
    pub async fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", db_path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let storage = Self { pool };
        storage.initialize().await?;

        Ok(storage)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                model TEXT NOT NULL,
                filename TEXT NOT NULL,
                prediction TEXT NOT NULL,
                class_index INTEGER NOT NULL,
                confidence REAL NOT NULL,
                scores_json TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_predictions_created_at ON predictions(created_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_predictions_model ON predictions(model)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("SQLite database initialized");
        Ok(())
    }
}

fn record_from_row(row: SqliteRow) -> PredictionRecord {
    PredictionRecord {
        id: row.get("id"),
        model: row.get("model"),
        filename: row.get("filename"),
        prediction: row.get("prediction"),
        class_index: row.get("class_index"),
        confidence: row.get("confidence"),
        scores_json: row.get("scores_json"),
        duration_ms: row.get("duration_ms"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl PredictionStore for SqliteStorage {
    async fn save_prediction(&self, record: &PredictionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions (id, model, filename, prediction, class_index, confidence, scores_json, duration_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.model)
        .bind(&record.filename)
        .bind(&record.prediction)
        .bind(record.class_index)
        .bind(record.confidence)
        .bind(&record.scores_json)
        .bind(record.duration_ms)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        debug!("Saved prediction: {}", record.id);
        Ok(())
    }

    async fn list_predictions(&self, limit: i64, model: Option<&str>) -> Result<Vec<PredictionRecord>> {
        let rows = if let Some(m) = model {
            sqlx::query(
                r#"
                SELECT id, model, filename, prediction, class_index, confidence, scores_json, duration_ms, created_at
                FROM predictions
                WHERE model = ?
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?
                "#,
            )
            .bind(m)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT id, model, filename, prediction, class_index, confidence, scores_json, duration_ms, created_at
                FROM predictions
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows.into_iter().map(record_from_row).collect())
    }

    async fn get_prediction(&self, id: &str) -> Result<Option<PredictionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, model, filename, prediction, class_index, confidence, scores_json, duration_ms, created_at
            FROM predictions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(record_from_row))
    }

    async fn delete_prediction(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM predictions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_predictions(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM predictions")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count_predictions(&self, model: Option<&str>) -> Result<i64> {
        let row = match model {
            Some(model) => {
                sqlx::query("SELECT COUNT(*) as count FROM predictions WHERE model = ?")
                    .bind(model)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT COUNT(*) as count FROM predictions")
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(row.get("count"))
    }
}
