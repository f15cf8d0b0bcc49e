//! Classification service configuration

use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::engine::preprocess::{Normalization, TensorLayout};
use crate::engine::ModelKind;

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "CYTOSCAN_CONFIG";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub models: ModelsConfig,
    pub classes: ClassesConfig,
    pub upload: UploadConfig,
    pub metrics: MetricsConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub device: String,
    pub default_model: ModelKind,
    pub preload: bool,
    /// Seconds a model may sit unused before it is dropped. 0 keeps it forever.
    pub model_idle_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawModelsConfig")]
pub struct ModelsConfig {
    pub cnn: ModelConfig,
    pub vgg16: ModelConfig,
}

/// Per-artifact settings
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub input_size: u32,
    pub preprocessing: Normalization,
    pub layout: TensorLayout,
    /// Named signature output to read instead of output 0
    pub output_name: Option<String>,
}

/// `[models]` as written in the file. Keys left out keep the per-model defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawModelsConfig {
    cnn: RawModelConfig,
    vgg16: RawModelConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawModelConfig {
    path: Option<PathBuf>,
    input_size: Option<u32>,
    preprocessing: Option<Normalization>,
    layout: Option<TensorLayout>,
    output_name: Option<String>,
}

impl RawModelConfig {
    fn merge_into(self, base: ModelConfig) -> ModelConfig {
        ModelConfig {
            path: self.path.unwrap_or(base.path),
            input_size: self.input_size.unwrap_or(base.input_size),
            preprocessing: self.preprocessing.unwrap_or(base.preprocessing),
            layout: self.layout.unwrap_or(base.layout),
            output_name: self.output_name.or(base.output_name),
        }
    }
}

impl From<RawModelsConfig> for ModelsConfig {
    fn from(raw: RawModelsConfig) -> Self {
        let defaults = ModelsConfig::default();
        Self {
            cnn: raw.cnn.merge_into(defaults.cnn),
            vgg16: raw.vgg16.merge_into(defaults.vgg16),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassesConfig {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub allowed_extensions: Vec<String>,
    /// Rotate uploads by their EXIF orientation tag before preprocessing.
    /// Off by default: the models were trained on the stored pixel order.
    pub exif_orientation: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub history_enabled: bool,
    pub sqlite_path: PathBuf,
}

fn default_input_size() -> u32 {
    224
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> String {
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.toml".to_string())
    }

    pub fn model(&self, kind: ModelKind) -> &ModelConfig {
        match kind {
            ModelKind::Cnn => &self.models.cnn,
            ModelKind::Vgg16 => &self.models.vgg16,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.classes.names.is_empty() {
            anyhow::bail!("classes.names must not be empty");
        }
        let mut seen = HashSet::new();
        for name in &self.classes.names {
            if !seen.insert(name.as_str()) {
                anyhow::bail!("classes.names contains '{}' more than once", name);
            }
        }
        for kind in ModelKind::ALL {
            if self.model(kind).input_size == 0 {
                anyhow::bail!("models.{}.input_size must be positive", kind);
            }
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            device: "CPU".to_string(),
            default_model: ModelKind::Vgg16,
            preload: true,
            model_idle_timeout: 0,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            cnn: ModelConfig {
                path: PathBuf::from("models/cnn_final.onnx"),
                input_size: default_input_size(),
                preprocessing: Normalization::Rescale,
                layout: TensorLayout::Nhwc,
                output_name: None,
            },
            vgg16: ModelConfig {
                path: PathBuf::from("models/vgg16_final.onnx"),
                input_size: default_input_size(),
                preprocessing: Normalization::Vgg16,
                layout: TensorLayout::Nhwc,
                output_name: None,
            },
        }
    }
}

impl Default for ClassesConfig {
    fn default() -> Self {
        Self {
            names: vec![
                "High squamous intra-epithelial lesion".to_string(),
                "Low squamous intra-epithelial lesion".to_string(),
                "Negative for Intraepithelial malignancy".to_string(),
                "Squamous cell carcinoma".to_string(),
            ],
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: ["png", "jpg", "jpeg", "bmp", "tiff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exif_orientation: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("metrics"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_enabled: true,
            sqlite_path: PathBuf::from("data/predictions.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.inference.default_model, ModelKind::Vgg16);
        assert_eq!(config.classes.names.len(), 4);
        assert_eq!(config.models.vgg16.preprocessing, Normalization::Vgg16);
        assert_eq!(config.models.cnn.preprocessing, Normalization::Rescale);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 8080

            [models.cnn]
            path = "weights/cnn.xml"
            preprocessing = "none"
            layout = "nchw"
            output_name = "dense_2"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.models.cnn.path, PathBuf::from("weights/cnn.xml"));
        assert_eq!(config.models.cnn.input_size, 224);
        assert_eq!(config.models.cnn.layout, TensorLayout::Nchw);
        assert_eq!(config.models.cnn.output_name.as_deref(), Some("dense_2"));
        assert_eq!(config.models.vgg16.preprocessing, Normalization::Vgg16);
        assert_eq!(config.upload.allowed_extensions.len(), 5);
    }

    #[test]
    fn test_load_rejects_empty_classes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[classes]\nnames = []\n").unwrap();

        assert!(Config::load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_partial_model_section_keeps_model_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 8080

            [models.cnn]
            path = "w/cnn.xml"

            [models.vgg16]
            input_size = 256
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.models.cnn.path, PathBuf::from("w/cnn.xml"));
        assert_eq!(config.models.cnn.preprocessing, Normalization::Rescale);
        assert_eq!(config.models.cnn.input_size, 224);
        assert_eq!(config.models.vgg16.path, PathBuf::from("models/vgg16_final.onnx"));
        assert_eq!(config.models.vgg16.preprocessing, Normalization::Vgg16);
        assert_eq!(config.models.vgg16.input_size, 256);
        assert!(!config.upload.exif_orientation);
    }

    #[test]
    fn test_unknown_model_key_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[models.cnn]\npreprocesing = \"none\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_rejects_duplicate_classes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[classes]\nnames = [\"a\", \"b\", \"a\"]\n").unwrap();

        let err = Config::load(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("'a' more than once"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load("/nonexistent/cytoscan.toml").is_err());
    }
}
