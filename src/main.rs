//! Cervical Cytology Classification Service
//!
//! Serves pretrained CNN and VGG16 classifiers over a REST (Axum) API,
//! running inference through OpenVINO.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cytoscan::config::Config;
use cytoscan::engine::{MetricsStore, ModelPool, OpenVinoLoader};
use cytoscan::service::ClassifierService;
use cytoscan::storage::SqliteStorage;
use cytoscan::api::{AppState, create_rest_router};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Starting Cytology Classification Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = Config::default_path();
    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            warn!("Invalid config {}, using defaults: {:#}", config_path, e);
            Config::default()
        })
    } else {
        info!("No config file at {}, using defaults", config_path);
        Config::default()
    };
    let config = Arc::new(config);

    info!("Configuration loaded:");
    info!("  Listen: {}:{}", config.server.host, config.server.port);
    info!("  Device: {}", config.inference.device);
    info!("  Default model: {}", config.inference.default_model);
    info!("  CNN model: {}", config.models.cnn.path.display());
    info!("  VGG16 model: {}", config.models.vgg16.path.display());
    info!("  Model idle timeout: {}s", config.inference.model_idle_timeout);

    // Initialize model pool
    let loader = Arc::new(OpenVinoLoader::new(&config.inference.device));
    let pool = Arc::new(ModelPool::new(config.clone(), loader));

    if config.inference.preload {
        let pool_clone = pool.clone();
        let loaded = tokio::task::spawn_blocking(move || pool_clone.preload()).await?;
        if loaded == 0 {
            warn!("No model could be pre-loaded; models will load on first request");
        } else {
            info!("Pre-loaded {} model(s)", loaded);
        }
    }

    // Start model cleanup task
    let pool_clone = pool.clone();
    tokio::spawn(async move {
        pool_clone.start_cleanup_task().await;
    });

    // Initialize prediction history
    let storage = if config.storage.history_enabled {
        let path = config
            .storage
            .sqlite_path
            .to_str()
            .context("storage.sqlite_path is not valid UTF-8")?;
        let storage = Arc::new(SqliteStorage::new(path).await?);
        info!("SQLite storage initialized at: {}", path);
        Some(storage)
    } else {
        info!("Prediction history disabled");
        None
    };

    let metrics = MetricsStore::new(config.metrics.dir.clone());
    info!("Metrics directory: {}", metrics.dir().display());
    let service = Arc::new(ClassifierService::new(pool.clone(), metrics, config.clone()));

    let app_state = Arc::new(AppState {
        service,
        storage,
        start_time: Instant::now(),
    });

    let router = create_rest_router(app_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("REST API listening on http://{}", addr);
    info!("Health: http://localhost:{}/api/health", config.server.port);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received, cleaning up...");
        })
        .await?;

    pool.shutdown();

    info!("Goodbye!");
    Ok(())
}
