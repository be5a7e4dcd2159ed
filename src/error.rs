use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading the encoder and classifier artifacts.
///
/// These are fatal: the server does not start without both artifacts.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("failed to read artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid encoder artifact {}: {reason}", path.display())]
    Encoder { path: PathBuf, reason: String },
    #[error("failed to load classifier {}: {reason}", path.display())]
    Classifier { path: PathBuf, reason: String },
    #[error("encoder produces {encoder} features but classifier expects {classifier}")]
    WidthMismatch { encoder: usize, classifier: usize },
}

/// A booking record that is missing a field or carries an out-of-domain value.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("field `{field}` is out of range: {value} is not within [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },
    #[error("field `{field}` has unknown value `{value}`")]
    UnknownChoice { field: &'static str, value: String },
}

/// A collaborator failed or returned a value outside its contract.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("feature encoder failed: {0}")]
    Encoder(String),
    #[error("classifier failed: {0}")]
    Classifier(String),
    #[error("classifier returned {0} values, expected exactly one score")]
    Shape(usize),
    #[error("classifier score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
    #[error("inference task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}
