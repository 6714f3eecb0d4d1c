//! Predictor adapter
//!
//! The trained model is an opaque artifact behind the [`Predictor`] trait:
//! an ordered list of encoded feature names, a probability-producing
//! inference call and an importance vector aligned with those names.
//! [`PredictorAdapter`] owns the loaded artifact, translates validated
//! requests into its column layout and normalizes its output. An artifact
//! that failed to load leaves the adapter in an unavailable state instead of
//! stopping the process.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::types::PredictionRequest;

pub mod artifact;
pub mod encoding;

pub use artifact::LogisticArtifact;
pub use encoding::FeatureEncoder;

/// Contract every loaded model artifact fulfils.
///
/// Implementations must be read-only after construction: `predict_proba`
/// is called concurrently from many requests and must return the same
/// value for the same row every time.
pub trait Predictor: Send + Sync {
    /// Encoded column names in the order `predict_proba` expects.
    fn feature_names(&self) -> &[String];

    /// Probability of the positive (survival) class for one encoded row.
    fn predict_proba(&self, row: &[f64]) -> Result<f64, PredictorError>;

    /// Global importance per column, aligned with `feature_names`.
    fn feature_importances(&self) -> &[f64];

    fn version(&self) -> Option<&str> {
        None
    }
}

/// Errors raised while loading an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid artifact: {0}")]
    Invalid(String),

    #[error("artifact column {0:?} does not map to a request field")]
    UnknownFeature(String),

    #[error("artifact column {0:?} is declared twice")]
    DuplicateFeature(String),
}

/// Errors raised at inference time.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("encoded row has {actual} columns, artifact expects {expected}")]
    Shape { expected: usize, actual: usize },

    #[error("model produced a non-finite probability ({0})")]
    NonFinite(f64),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Normalized model output for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub probability: f64,
    pub importances: BTreeMap<String, f64>,
}

enum ModelState {
    Loaded {
        predictor: Arc<dyn Predictor>,
        encoder: FeatureEncoder,
        importances: BTreeMap<String, f64>,
    },
    Unavailable {
        reason: String,
    },
}

pub struct PredictorAdapter {
    state: ModelState,
}

impl PredictorAdapter {
    /// Wrap an already constructed predictor, resolving its columns.
    pub fn new(predictor: Arc<dyn Predictor>) -> Result<Self, ArtifactError> {
        let names = predictor.feature_names();
        let encoder = FeatureEncoder::from_feature_names(names)?;

        let weights = predictor.feature_importances();
        if weights.len() != names.len() {
            return Err(ArtifactError::Invalid(format!(
                "{} importances for {} features",
                weights.len(),
                names.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ArtifactError::Invalid(
                "feature importances must be finite and non-negative".to_string(),
            ));
        }

        let importances = names.iter().cloned().zip(weights.iter().copied()).collect();

        Ok(Self {
            state: ModelState::Loaded {
                predictor,
                encoder,
                importances,
            },
        })
    }

    /// Adapter that refuses every prediction.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: ModelState::Unavailable {
                reason: reason.into(),
            },
        }
    }

    /// Load the artifact at `path`. Failures are logged and produce an
    /// unavailable adapter so the service can still report its health.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let loaded = LogisticArtifact::load(path)
            .and_then(|artifact| Self::new(Arc::new(artifact)));

        match loaded {
            Ok(adapter) => {
                tracing::info!(
                    path = %path.display(),
                    version = adapter.version().unwrap_or("unversioned"),
                    "Model loaded successfully"
                );
                adapter
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "Failed to load model");
                Self::unavailable(err.to_string())
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ModelState::Loaded { .. })
    }

    pub fn version(&self) -> Option<&str> {
        match &self.state {
            ModelState::Loaded { predictor, .. } => predictor.version(),
            ModelState::Unavailable { .. } => None,
        }
    }

    /// Why the model is unavailable, if it is.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            ModelState::Loaded { .. } => None,
            ModelState::Unavailable { reason } => Some(reason),
        }
    }

    /// Run the model for a validated request.
    pub fn predict(&self, request: &PredictionRequest) -> Result<Prediction, PredictorError> {
        let (predictor, encoder, importances) = match &self.state {
            ModelState::Loaded {
                predictor,
                encoder,
                importances,
            } => (predictor, encoder, importances),
            ModelState::Unavailable { reason } => {
                return Err(PredictorError::ModelUnavailable(reason.clone()));
            }
        };

        let row = encoder.encode(request);
        let probability = predictor.predict_proba(&row)?;
        if !probability.is_finite() {
            return Err(PredictorError::NonFinite(probability));
        }

        Ok(Prediction {
            probability: probability.clamp(0.0, 1.0),
            importances: importances.clone(),
        })
    }
}
