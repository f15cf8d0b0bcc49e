//! OpenVINO-backed model loading and inference
//!
//! OpenVINO reads ONNX files, its own IR (`.xml` + `.bin`) and TensorFlow
//! SavedModel directories, so every exported form of the classifiers goes
//! through the same path.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use ndarray::Array4;
use openvino::{CompiledModel, Core, ElementType, Shape, Tensor};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::ModelConfig;

use super::classifier::{Classifier, ModelLoader};
use super::model::ModelKind;

/// Wrapper for OpenVINO Core that can cross threads
struct SafeCore(Core);
unsafe impl Send for SafeCore {}

/// Wrapper for OpenVINO CompiledModel that can cross threads
struct SafeCompiledModel(CompiledModel);
unsafe impl Send for SafeCompiledModel {}

/// Loads artifacts with a single, lazily created OpenVINO core
pub struct OpenVinoLoader {
    core: Mutex<Option<SafeCore>>,
    device: String,
}

impl OpenVinoLoader {
    pub fn new(device: &str) -> Self {
        Self {
            core: Mutex::new(None),
            device: device.to_string(),
        }
    }
}

impl ModelLoader for OpenVinoLoader {
    fn load(&self, kind: ModelKind, config: &ModelConfig) -> Result<Arc<dyn Classifier>> {
        let path = config
            .path
            .to_str()
            .with_context(|| format!("Model path for {} is not valid UTF-8", kind))?;

        let start = Instant::now();

        // Core methods take &mut self in the Rust bindings
        let mut guard = self.core.lock();
        if guard.is_none() {
            let core = Core::new().context("Failed to initialize the OpenVINO runtime")?;
            info!("OpenVINO runtime initialized");
            *guard = Some(SafeCore(core));
        }
        let core = match guard.as_mut() {
            Some(core) => &mut core.0,
            None => anyhow::bail!("OpenVINO runtime unavailable"),
        };

        let model = core
            .read_model_from_file(path, "")
            .with_context(|| format!("Failed to read model {} from {}", kind, path))?;
        let compiled = core
            .compile_model(&model, self.device.as_str().into())
            .with_context(|| format!("Failed to compile model {} for {}", kind, self.device))?;

        info!("Model {} compiled for {} in {:?}", kind, self.device, start.elapsed());

        Ok(Arc::new(OpenVinoClassifier {
            kind,
            compiled: Mutex::new(SafeCompiledModel(compiled)),
            output_name: config.output_name.clone(),
        }))
    }
}

/// A compiled model exposed through [`Classifier`]
pub struct OpenVinoClassifier {
    kind: ModelKind,
    compiled: Mutex<SafeCompiledModel>,
    /// Signature output to read; output 0 when unset
    output_name: Option<String>,
}

impl Classifier for OpenVinoClassifier {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let mut request = self.compiled.lock().0.create_infer_request()?;

        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let input_shape = Shape::new(&dims)?;
        let mut tensor = Tensor::new(ElementType::F32, &input_shape)?;

        {
            let raw = tensor.get_raw_data_mut()?;
            if raw.len() != input.len() * 4 {
                anyhow::bail!(
                    "Input tensor holds {} bytes, expected {}",
                    raw.len(),
                    input.len() * 4
                );
            }
            for (dst, value) in raw.chunks_exact_mut(4).zip(input.iter()) {
                dst.copy_from_slice(&value.to_ne_bytes());
            }
        }

        request.set_input_tensor(&tensor)?;
        request.infer()?;

        let output = match &self.output_name {
            Some(name) => request
                .get_tensor(name)
                .with_context(|| format!("Model {} has no output named '{}'", self.kind, name))?,
            None => request.get_output_tensor()?,
        };

        let output_shape = output.get_shape()?;
        let output_dims: Vec<i64> = output_shape.get_dimensions().to_vec();
        let scores: Vec<f32> = output
            .get_raw_data()?
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        debug!("Model {} raw output {:?}: {:?}", self.kind, output_dims, scores);

        // [1, classes] or [classes]; keep the first batch row
        let per_item = match output_dims.as_slice() {
            [batch, rest @ ..] if *batch > 0 && !rest.is_empty() => scores.len() / *batch as usize,
            _ => scores.len(),
        };

        Ok(scores.into_iter().take(per_item).collect())
    }
}
