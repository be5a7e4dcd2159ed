use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_graphql::Enum;
use tracing::{debug, info};

use crate::booking::{BookingRecord, RawRecord};
use crate::classifier::{load_classifier, Classifier};
use crate::encoder::{Encoder, Preprocessor};
use crate::error::{ArtifactLoadError, InferenceError, PredictError};
use crate::settings::ModelSettings;

/// Scores at or above this value are labelled as cancellations.
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum CancellationLabel {
    Canceled,
    NotCanceled,
}

impl fmt::Display for CancellationLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Canceled => f.write_str("CANCELED"),
            Self::NotCanceled => f.write_str("NOT CANCELED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionOutcome {
    pub label: CancellationLabel,
    /// Confidence in `label`, in percent.
    pub probability_percent: f64,
}

impl PredictionOutcome {
    /// Applies the decision threshold to a classifier score.
    pub fn from_score(score: f32) -> Result<Self, InferenceError> {
        let score = f64::from(score);
        if !(0.0..=1.0).contains(&score) {
            return Err(InferenceError::ScoreOutOfRange(score));
        }
        let probability = score * 100.0;
        Ok(if score >= DECISION_THRESHOLD {
            Self {
                label: CancellationLabel::Canceled,
                probability_percent: probability,
            }
        } else {
            Self {
                label: CancellationLabel::NotCanceled,
                probability_percent: 100.0 - probability,
            }
        })
    }

    pub fn message(&self) -> String {
        format!(
            "Likely to be {} ({:.2}% probability)",
            self.label, self.probability_percent
        )
    }
}

/// Runs a booking through the encoder and classifier.
///
/// Both collaborators are loaded once and only read afterwards, so a single
/// `Predictor` is cloned into every request handler.
#[derive(Clone)]
pub struct Predictor {
    encoder: Arc<dyn Encoder>,
    classifier: Arc<dyn Classifier>,
    timeout: Option<Duration>,
}

impl Predictor {
    pub fn new(encoder: Arc<dyn Encoder>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            encoder,
            classifier,
            timeout: None,
        }
    }

    /// Bounds the inference time of `predict_async`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Loads both artifacts named in the settings.
    pub fn load(settings: &ModelSettings) -> Result<Self, ArtifactLoadError> {
        let encoder = Preprocessor::load(&settings.encoder)?;
        info!(
            "Loaded feature encoder from {} ({} features)",
            settings.encoder.display(),
            encoder.width()
        );
        let classifier = load_classifier(&settings.classifier)?;
        if let Some(width) = classifier.input_width() {
            if width != encoder.width() {
                return Err(ArtifactLoadError::WidthMismatch {
                    encoder: encoder.width(),
                    classifier: width,
                });
            }
        }
        Ok(Self::new(Arc::new(encoder), classifier).with_timeout(settings.inference_timeout()))
    }

    /// Validates a raw booking and predicts its outcome.
    pub fn predict(&self, raw: &RawRecord) -> Result<PredictionOutcome, PredictError> {
        let record = BookingRecord::from_raw(raw)?;
        Ok(self.infer(&record)?)
    }

    /// Like `predict`, but runs inference on the blocking pool under the
    /// configured timeout.
    pub async fn predict_async(&self, raw: &RawRecord) -> Result<PredictionOutcome, PredictError> {
        let record = BookingRecord::from_raw(raw)?;
        let predictor = self.clone();
        let task = tokio::task::spawn_blocking(move || predictor.infer(&record));
        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| InferenceError::Timeout(limit))?,
            None => task.await,
        };
        let outcome = joined.map_err(|e| InferenceError::Aborted(e.to_string()))??;
        Ok(outcome)
    }

    pub fn infer(&self, record: &BookingRecord) -> Result<PredictionOutcome, InferenceError> {
        let features = self
            .encoder
            .transform(record)
            .map_err(|e| InferenceError::Encoder(format!("{e:#}")))?;
        let outputs = self
            .classifier
            .predict(&features)
            .map_err(|e| InferenceError::Classifier(format!("{e:#}")))?;
        let [score] = outputs.as_slice() else {
            return Err(InferenceError::Shape(outputs.len()));
        };
        debug!("Scored {} features: {}", features.len(), score);
        PredictionOutcome::from_score(*score)
    }
}
