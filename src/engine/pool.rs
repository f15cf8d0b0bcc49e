//! Model Pool Manager
//!
//! Loads each classifier on first use and keeps it in memory. With a
//! non-zero idle timeout a background task drops models nobody has asked
//! for recently; otherwise they live as long as the process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::Config;

use super::classifier::{Classifier, ModelLoader};
use super::model::ModelKind;

/// A cached model with its last access time
struct CachedModel {
    classifier: Arc<dyn Classifier>,
    last_access: Instant,
}

/// Model Pool Manager with lazy loading and optional idle unloading
pub struct ModelPool {
    loader: Arc<dyn ModelLoader>,
    config: Arc<Config>,
    idle_timeout: Option<Duration>,

    cnn: RwLock<Option<CachedModel>>,
    vgg16: RwLock<Option<CachedModel>>,

    shutdown: Notify,
}

impl ModelPool {
    /// Create a new model pool. Nothing is loaded until requested.
    pub fn new(config: Arc<Config>, loader: Arc<dyn ModelLoader>) -> Self {
        let idle_timeout = match config.inference.model_idle_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            loader,
            config,
            idle_timeout,
            cnn: RwLock::new(None),
            vgg16: RwLock::new(None),
            shutdown: Notify::new(),
        }
    }

    fn cache(&self, kind: ModelKind) -> &RwLock<Option<CachedModel>> {
        match kind {
            ModelKind::Cnn => &self.cnn,
            ModelKind::Vgg16 => &self.vgg16,
        }
    }

    /// Whether the artifact for this model exists on disk
    pub fn is_available(&self, kind: ModelKind) -> bool {
        self.config.model(kind).path.exists()
    }

    /// Get or load a model
    pub fn get_model(&self, kind: ModelKind) -> anyhow::Result<Arc<dyn Classifier>> {
        let cache = self.cache(kind);

        // Fast path: already loaded
        if cache.read().is_some() {
            let mut write_guard = cache.write();
            if let Some(ref mut cached) = *write_guard {
                cached.last_access = Instant::now();
                return Ok(cached.classifier.clone());
            }
        }

        let mut write_guard = cache.write();

        // Double-check after acquiring write lock
        if let Some(ref mut cached) = *write_guard {
            cached.last_access = Instant::now();
            return Ok(cached.classifier.clone());
        }

        let config = self.config.model(kind);
        if !config.path.exists() {
            anyhow::bail!(ModelNotFound {
                kind,
                path: config.path.display().to_string(),
            });
        }

        info!("Loading model: {} from {}", kind, config.path.display());
        let start = Instant::now();
        let classifier = self.loader.load(kind, config)?;
        info!("Model {} loaded in {:?}", kind, start.elapsed());

        *write_guard = Some(CachedModel {
            classifier: classifier.clone(),
            last_access: Instant::now(),
        });

        Ok(classifier)
    }

    /// Check if a model is loaded
    pub fn is_loaded(&self, kind: ModelKind) -> bool {
        self.cache(kind).read().is_some()
    }

    /// Loaded flag for every model
    pub fn get_status(&self) -> Vec<(ModelKind, bool)> {
        ModelKind::ALL
            .into_iter()
            .map(|kind| (kind, self.is_loaded(kind)))
            .collect()
    }

    /// Load every model whose artifact is present. Returns how many loaded.
    pub fn preload(&self) -> usize {
        let mut loaded = 0;
        for kind in ModelKind::ALL {
            if !self.is_available(kind) {
                warn!(
                    "Skipping preload of {}: {} not found",
                    kind,
                    self.config.model(kind).path.display()
                );
                continue;
            }
            match self.get_model(kind) {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Could not preload model {}: {:#}", kind, e),
            }
        }
        loaded
    }

    fn unload_model(&self, kind: ModelKind) {
        let mut write_guard = self.cache(kind).write();
        if write_guard.is_some() {
            info!("Unloading idle model: {}", kind);
            *write_guard = None;
        }
    }

    /// Check and unload idle models
    fn cleanup_idle_models(&self, idle_timeout: Duration) {
        let now = Instant::now();

        for kind in ModelKind::ALL {
            let should_unload = match *self.cache(kind).read() {
                Some(ref cached) => now.duration_since(cached.last_access) > idle_timeout,
                None => false,
            };

            if should_unload {
                self.unload_model(kind);
            }
        }
    }

    /// Background cleanup loop. Returns immediately when idle unloading is off.
    pub async fn start_cleanup_task(self: Arc<Self>) {
        let Some(idle_timeout) = self.idle_timeout else {
            debug!("Model idle timeout disabled; models stay loaded");
            return;
        };

        let check_interval = Duration::from_secs(60).min(idle_timeout);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(check_interval) => {
                    debug!("Running model cleanup check");
                    self.cleanup_idle_models(idle_timeout);
                }
                _ = self.shutdown.notified() => {
                    info!("Model pool cleanup task shutting down");
                    break;
                }
            }
        }
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl Drop for ModelPool {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

/// Returned when a model's artifact is absent from disk
#[derive(Debug, thiserror::Error)]
#[error("Model file not found for {kind}: {path}")]
pub struct ModelNotFound {
    pub kind: ModelKind,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ndarray::Array4;

    use crate::config::ModelConfig;

    struct Fixed(Vec<f32>);

    impl Classifier for Fixed {
        fn predict(&self, _input: &Array4<f32>) -> anyhow::Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, _kind: ModelKind, _config: &ModelConfig) -> anyhow::Result<Arc<dyn Classifier>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Fixed(vec![1.0, 0.0])))
        }
    }

    fn config_with_artifacts(dir: &std::path::Path, idle: u64) -> Arc<Config> {
        let mut config = Config::default();
        config.inference.model_idle_timeout = idle;
        config.models.cnn.path = dir.join("cnn.onnx");
        config.models.vgg16.path = dir.join("vgg16.onnx");
        std::fs::write(&config.models.cnn.path, b"stub").unwrap();
        Arc::new(config)
    }

    #[test]
    fn test_lazy_load_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Arc::new(CountingLoader::default());
        let pool = ModelPool::new(config_with_artifacts(dir.path(), 0), loader.clone());

        assert!(!pool.is_loaded(ModelKind::Cnn));
        pool.get_model(ModelKind::Cnn).unwrap();
        pool.get_model(ModelKind::Cnn).unwrap();

        assert!(pool.is_loaded(ModelKind::Cnn));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_artifact_skips_loader() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Arc::new(CountingLoader::default());
        let pool = ModelPool::new(config_with_artifacts(dir.path(), 0), loader.clone());

        let err = pool.get_model(ModelKind::Vgg16).err().unwrap();
        assert!(err.downcast_ref::<ModelNotFound>().is_some());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
        assert!(!pool.is_available(ModelKind::Vgg16));
    }

    #[test]
    fn test_preload_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ModelPool::new(
            config_with_artifacts(dir.path(), 0),
            Arc::new(CountingLoader::default()),
        );

        assert_eq!(pool.preload(), 1);
        assert_eq!(
            pool.get_status(),
            vec![(ModelKind::Cnn, true), (ModelKind::Vgg16, false)]
        );
    }

    #[test]
    fn test_cleanup_unloads_idle_models() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ModelPool::new(
            config_with_artifacts(dir.path(), 1),
            Arc::new(CountingLoader::default()),
        );

        pool.get_model(ModelKind::Cnn).unwrap();
        pool.cleanup_idle_models(Duration::from_secs(3600));
        assert!(pool.is_loaded(ModelKind::Cnn));

        std::thread::sleep(Duration::from_millis(5));
        pool.cleanup_idle_models(Duration::from_millis(1));
        assert!(!pool.is_loaded(ModelKind::Cnn));
    }

    #[tokio::test]
    async fn test_cleanup_task_exits_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(ModelPool::new(
            config_with_artifacts(dir.path(), 0),
            Arc::new(CountingLoader::default()),
        ));

        // Would loop forever if the timeout were active
        pool.clone().start_cleanup_task().await;
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(ModelPool::new(
            config_with_artifacts(dir.path(), 3600),
            Arc::new(CountingLoader::default()),
        ));

        let task = tokio::spawn(pool.clone().start_cleanup_task());
        tokio::task::yield_now().await;
        pool.shutdown();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("cleanup task did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_task_unloads_idle_model() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(ModelPool::new(
            config_with_artifacts(dir.path(), 1),
            Arc::new(CountingLoader::default()),
        ));

        pool.get_model(ModelKind::Cnn).unwrap();
        let task = tokio::spawn(pool.clone().start_cleanup_task());

        // Checks run every second; the second one sees the model idle past 1s
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!pool.is_loaded(ModelKind::Cnn));

        pool.shutdown();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("cleanup task did not stop")
            .unwrap();
    }
}
