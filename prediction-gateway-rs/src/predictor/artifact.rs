//! Serialized model artifact produced by the offline training step.
//!
//! The bundled format is a standardized logistic model stored as JSON:
//!
//! ```json
//! {
//!   "model_type": "logistic",
//!   "version": "hct-logit-1",
//!   "feature_names": ["age", "...", "conditioning_intensity_Reduced-intensity"],
//!   "means": [...], "scales": [...],
//!   "coefficients": [...], "intercept": -1.02,
//!   "feature_importances": [...]
//! }
//! ```
//!
//! All vectors are aligned with `feature_names`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ArtifactError, Predictor, PredictorError};

pub const LOGISTIC_MODEL_TYPE: &str = "logistic";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticArtifact {
    pub model_type: String,
    #[serde(default)]
    pub version: Option<String>,
    pub feature_names: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub feature_importances: Vec<f64>,
}

impl LogisticArtifact {
    /// Read and check an artifact file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let artifact: LogisticArtifact = serde_json::from_slice(bytes)?;
        artifact.check()?;
        Ok(artifact)
    }

    fn check(&self) -> Result<(), ArtifactError> {
        if self.model_type != LOGISTIC_MODEL_TYPE {
            return Err(ArtifactError::Invalid(format!(
                "unsupported model_type {:?}",
                self.model_type
            )));
        }

        let width = self.feature_names.len();
        for (name, len) in [
            ("means", self.means.len()),
            ("scales", self.scales.len()),
            ("coefficients", self.coefficients.len()),
            ("feature_importances", self.feature_importances.len()),
        ] {
            if len != width {
                return Err(ArtifactError::Invalid(format!(
                    "{} has {} entries, expected {}",
                    name, len, width
                )));
            }
        }

        let all_finite = self
            .means
            .iter()
            .chain(&self.scales)
            .chain(&self.coefficients)
            .chain(&self.feature_importances)
            .chain(std::iter::once(&self.intercept))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ArtifactError::Invalid("artifact contains non-finite values".to_string()));
        }

        if let Some(idx) = self.scales.iter().position(|s| *s == 0.0) {
            return Err(ArtifactError::Invalid(format!(
                "scale for {} is zero",
                self.feature_names[idx]
            )));
        }

        if self.feature_importances.iter().any(|w| *w < 0.0) {
            return Err(ArtifactError::Invalid("feature importances must be non-negative".to_string()));
        }

        Ok(())
    }
}

impl Predictor for LogisticArtifact {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, row: &[f64]) -> Result<f64, PredictorError> {
        if row.len() != self.feature_names.len() {
            return Err(PredictorError::Shape {
                expected: self.feature_names.len(),
                actual: row.len(),
            });
        }

        let logit = row
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .zip(&self.coefficients)
            .fold(self.intercept, |acc, (((x, mean), scale), coef)| {
                acc + coef * (x - mean) / scale
            });

        Ok(1.0 / (1.0 + (-logit).exp()))
    }

    fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}
