use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ndarray::{Array2, CowArray};
use ort::{
    tensor::OrtOwnedTensor, Environment, GraphOptimizationLevel, Session, SessionBuilder, Value,
};
use serde::Deserialize;
use tracing::info;

use crate::error::ArtifactLoadError;

/// Maps one feature vector to the raw outputs of a binary classifier.
pub trait Classifier: Send + Sync {
    /// Returns every output value for a single row.
    fn predict(&self, features: &[f32]) -> Result<Vec<f32>>;

    /// The feature width the model was built for, when it declares one.
    fn input_width(&self) -> Option<usize>;
}

/// A network exported to ONNX, run through ONNX Runtime.
pub struct OnnxClassifier {
    session: Session,
}

impl OnnxClassifier {
    pub fn create_environment() -> Result<Arc<Environment>> {
        Ok(Arc::new(
            Environment::builder()
                .with_name("booking-classifier")
                .build()?,
        ))
    }

    pub fn load_model(model_file: &Path, environment: &Arc<Environment>) -> Result<Self> {
        let session = SessionBuilder::new(environment)?
            .with_optimization_level(GraphOptimizationLevel::Level1)?
            .with_intra_threads(1)?
            .with_model_from_file(model_file)
            .map_err(|e| anyhow::anyhow!("model loading failed: {}", e))?;
        if session.inputs.len() != 1 {
            bail!("expected one model input, found {}", session.inputs.len());
        }
        Ok(Self { session })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, features: &[f32]) -> Result<Vec<f32>> {
        let input = CowArray::from(Array2::from_shape_vec((1, features.len()), features.to_vec())?)
            .into_dyn();
        let inputs = vec![Value::from_array(self.session.allocator(), &input)?];
        let outputs = self.session.run(inputs)?;
        let first = outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("model produced no outputs"))?;
        let scores: OrtOwnedTensor<f32, _> = first.try_extract()?;
        let scores = scores.view().iter().copied().collect();
        Ok(scores)
    }

    fn input_width(&self) -> Option<usize> {
        declared_width(&self.session.inputs.first()?.dimensions)
    }
}

/// The feature width of a `[batch, width]` input; the batch axis may be symbolic.
fn declared_width(dimensions: &[Option<u32>]) -> Option<usize> {
    match dimensions {
        [_, Some(width)] => usize::try_from(*width).ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct LogisticFile {
    weights: Vec<f64>,
    bias: f64,
}

/// A linear model with a sigmoid output, stored as JSON weights.
#[derive(Debug)]
pub struct LogisticClassifier {
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticClassifier {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    fn from_json(text: &str) -> Result<Self> {
        let file: LogisticFile = serde_json::from_str(text)?;
        if file.weights.is_empty() {
            bail!("no weights");
        }
        if !file.bias.is_finite() || file.weights.iter().any(|w| !w.is_finite()) {
            bail!("weights and bias must be finite");
        }
        Ok(Self::new(file.weights, file.bias))
    }
}

impl Classifier for LogisticClassifier {
    fn predict(&self, features: &[f32]) -> Result<Vec<f32>> {
        if features.len() != self.weights.len() {
            bail!(
                "expected {} features, got {}",
                self.weights.len(),
                features.len()
            );
        }
        let z: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * f64::from(*x))
            .sum::<f64>()
            + self.bias;
        Ok(vec![(1.0 / (1.0 + (-z).exp())) as f32])
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.weights.len())
    }
}

/// Loads the classifier artifact, choosing the runtime by file extension.
pub fn load_classifier(path: &Path) -> Result<Arc<dyn Classifier>, ArtifactLoadError> {
    let failed = |reason: String| ArtifactLoadError::Classifier {
        path: PathBuf::from(path),
        reason,
    };
    let metadata = fs::metadata(path).map_err(|source| ArtifactLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_file() {
        return Err(failed("not a regular file".to_string()));
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("onnx") => {
            let environment =
                OnnxClassifier::create_environment().map_err(|e| failed(format!("{e:#}")))?;
            let model = OnnxClassifier::load_model(path, &environment)
                .map_err(|e| failed(format!("{e:#}")))?;
            info!("Loaded ONNX classifier from {}", path.display());
            Ok(Arc::new(model))
        }
        Some("json") => {
            let text = fs::read_to_string(path).map_err(|source| ArtifactLoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let model = LogisticClassifier::from_json(&text)
                .with_context(|| "invalid logistic model")
                .map_err(|e| failed(format!("{e:#}")))?;
            info!("Loaded logistic classifier from {}", path.display());
            Ok(Arc::new(model))
        }
        _ => Err(failed(
            "unsupported model format, expected .onnx or .json".to_string(),
        )),
    }
}
