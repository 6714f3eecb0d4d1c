//! Prediction orchestrator
//!
//! Drives one request through the pipeline:
//!
//! ```text
//! Received -> RateChecked -> Validated -> Predicted -> Logged -> Responded
//! ```
//!
//! The first three stages may exit early with an error. Whatever happens,
//! exactly one audit record is written before the response leaves.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use audit_ledger::{AuditOutcome, AuditRecord};
use chrono::Utc;
use serde_json::Value;

use crate::audit::AuditLogger;
use crate::error::PredictionError;
use crate::metrics::{GatewayMetrics, MetricsSnapshot};
use crate::predictor::{Prediction, PredictorAdapter};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::types::{
    label_for, Explainability, PredictionResponse, DISCLAIMER, IMPORTANCE_NOTES,
};
use crate::validation::{parse_body, validate};

pub const DEFAULT_THRESHOLD: f64 = 0.5;
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    RateChecked,
    Validated,
    Predicted,
    Logged,
    Responded,
}

impl RequestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStage::Received => "received",
            RequestStage::RateChecked => "rate_checked",
            RequestStage::Validated => "validated",
            RequestStage::Predicted => "predicted",
            RequestStage::Logged => "logged",
            RequestStage::Responded => "responded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Probabilities at or above this are "Likely to survive".
    pub threshold: f64,
    /// Number of importances returned; 0 returns all of them.
    pub top_k: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            top_k: DEFAULT_TOP_K,
        }
    }
}

pub struct PredictionOrchestrator {
    limiter: RateLimiter,
    predictor: PredictorAdapter,
    audit: AuditLogger,
    metrics: GatewayMetrics,
    settings: PipelineSettings,
}

/// Per-request bookkeeping carried through the stages.
struct RequestTrace {
    stage: RequestStage,
    input: Option<Value>,
}

impl PredictionOrchestrator {
    pub fn new(
        limiter: RateLimiter,
        predictor: PredictorAdapter,
        audit: AuditLogger,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            limiter,
            predictor,
            audit,
            metrics: GatewayMetrics::new(),
            settings,
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.predictor.is_loaded()
    }

    pub fn model_version(&self) -> Option<&str> {
        self.predictor.version()
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Handle one `POST /predict` body from `client_id`.
    pub async fn handle(
        &self,
        client_id: &str,
        body: &[u8],
    ) -> Result<PredictionResponse, PredictionError> {
        let received_at = Utc::now();
        let started = Instant::now();
        self.metrics.record_received();

        let mut trace = RequestTrace {
            stage: RequestStage::Received,
            input: None,
        };
        let result = self.run(client_id, body, started, &mut trace);
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let outcome = match &result {
            Ok(response) => AuditOutcome::Success {
                probability: response.probability,
                prediction: response.prediction.clone(),
            },
            Err(err) => AuditOutcome::Failure {
                error_kind: err.kind().to_string(),
                http_status: err.status().as_u16(),
                stage: trace.stage.as_str().to_string(),
            },
        };

        let mut record = AuditRecord::new(client_id, body, outcome, latency_ms);
        record.timestamp = received_at;
        if self.audit.include_input() {
            if let Some(input) = trace.input.take() {
                record = record.with_input(input);
            }
        }
        self.audit.record(record).await;
        trace.stage = RequestStage::Logged;

        match &result {
            Ok(response) => {
                self.metrics.record_success();
                tracing::info!(
                    client_id,
                    probability = response.probability,
                    prediction = %response.prediction,
                    latency_ms,
                    "Prediction made"
                );
            }
            Err(err) => {
                self.metrics.record_failure(err);
                match err {
                    PredictionError::Internal(detail) => tracing::error!(
                        client_id,
                        error_kind = err.kind(),
                        detail = %detail,
                        "Prediction failed"
                    ),
                    _ => tracing::warn!(
                        client_id,
                        error_kind = err.kind(),
                        error = %err,
                        "Prediction request rejected"
                    ),
                }
            }
        }

        trace.stage = RequestStage::Responded;
        tracing::debug!(client_id, stage = trace.stage.as_str(), latency_ms, "Request finished");
        result
    }

    fn run(
        &self,
        client_id: &str,
        body: &[u8],
        now: Instant,
        trace: &mut RequestTrace,
    ) -> Result<PredictionResponse, PredictionError> {
        if let RateDecision::Denied { retry_after } = self.limiter.admit(client_id, now) {
            return Err(PredictionError::RateLimited { retry_after });
        }
        trace.stage = RequestStage::RateChecked;

        let raw = parse_body(body)?;
        let request = validate(&raw);
        trace.input = Some(raw);
        let request = request?;
        trace.stage = RequestStage::Validated;

        let prediction = catch_unwind(AssertUnwindSafe(|| self.predictor.predict(&request)))
            .map_err(|panic| {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                PredictionError::Internal(format!("predictor panicked: {}", msg))
            })??;
        trace.stage = RequestStage::Predicted;

        Ok(self.assemble(prediction))
    }

    fn assemble(&self, prediction: Prediction) -> PredictionResponse {
        let label = label_for(prediction.probability, self.settings.threshold);

        PredictionResponse {
            probability: prediction.probability,
            prediction: label.to_string(),
            explainability: Explainability {
                feature_importance: top_k(prediction.importances, self.settings.top_k),
                notes: IMPORTANCE_NOTES.to_string(),
            },
            disclaimer: DISCLAIMER.to_string(),
        }
    }
}

/// Keep the `k` largest weights by magnitude; ties resolve by name.
fn top_k(importances: BTreeMap<String, f64>, k: usize) -> BTreeMap<String, f64> {
    if k == 0 || importances.len() <= k {
        return importances;
    }

    let mut ranked: Vec<(String, f64)> = importances.into_iter().collect();
    ranked.sort_by(|(name_a, a), (name_b, b)| {
        b.abs()
            .partial_cmp(&a.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| name_a.cmp(name_b))
    });
    ranked.truncate(k);
    ranked.into_iter().collect()
}
