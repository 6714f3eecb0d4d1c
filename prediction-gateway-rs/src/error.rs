//! Error taxonomy of the prediction pipeline and its HTTP mapping.
//!
//! Every failure is caught at the orchestrator boundary and rendered as a
//! structured body. Internal detail is logged server-side, never returned.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::predictor::PredictorError;
use crate::rate_limit::retry_after_seconds;
use crate::validation::{FieldViolation, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    /// Client sent a request that does not match the schema.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Client exceeded its request budget.
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The model artifact is not loaded.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Anything unexpected on the server side.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PredictorError> for PredictionError {
    fn from(err: PredictorError) -> Self {
        match err {
            PredictorError::ModelUnavailable(reason) => PredictionError::ModelUnavailable(reason),
            other => PredictionError::Internal(other.to_string()),
        }
    }
}

/// Error body returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldViolation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl PredictionError {
    /// Stable identifier used in responses, audit records and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::RateLimited { .. } => "rate_limited",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to HTTP status code and error response
    pub fn to_response(&self) -> (StatusCode, Json<ErrorBody>) {
        let mut body = ErrorBody {
            error: self.kind(),
            fields: None,
            details: None,
            retry_after_seconds: None,
        };

        match self {
            Self::Validation(err) => {
                body.fields = Some(err.fields());
                body.details = Some(err.violations().to_vec());
            }
            Self::RateLimited { retry_after } => {
                body.retry_after_seconds = Some(retry_after_seconds(*retry_after));
            }
            Self::ModelUnavailable(_) | Self::Internal(_) => {}
        }

        (self.status(), Json(body))
    }
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_response();
        let retry_after = body.retry_after_seconds;
        let mut response = (status, body).into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PredictionError::Validation(ValidationError::body("x")), 422, "validation"),
            (
                PredictionError::RateLimited { retry_after: Duration::from_millis(2500) },
                429,
                "rate_limited",
            ),
            (PredictionError::ModelUnavailable("missing".into()), 503, "model_unavailable"),
            (PredictionError::Internal("boom".into()), 500, "internal"),
        ];

        for (err, status, kind) in cases {
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(err.kind(), kind);
        }
    }

    #[test]
    fn test_bodies_do_not_leak_internal_detail() {
        let (_, Json(body)) =
            PredictionError::Internal("db password is hunter2".into()).to_response();
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({ "error": "internal" }));

        let (_, Json(body)) = PredictionError::ModelUnavailable("/srv/model.json".into()).to_response();
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({ "error": "model_unavailable" })
        );
    }

    #[test]
    fn test_rate_limited_body_and_header() {
        let err = PredictionError::RateLimited {
            retry_after: Duration::from_millis(2500),
        };
        let (_, Json(body)) = err.to_response();
        assert_eq!(body.retry_after_seconds, Some(3));

        let response = err.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");
    }

    #[test]
    fn test_predictor_errors_map_to_taxonomy() {
        let err: PredictionError = PredictorError::ModelUnavailable("x".into()).into();
        assert_eq!(err.kind(), "model_unavailable");

        let err: PredictionError = PredictorError::NonFinite(f64::NAN).into();
        assert_eq!(err.kind(), "internal");
    }
}
