//! Prediction Request Validation
//!
//! Turns an untrusted JSON body into a [`PredictionRequest`]. Every field is
//! checked for presence, integral type, range and enum membership; all
//! violations are collected so the caller can fix the request in one go.
//! Validation is pure and never touches the predictor.

use std::collections::BTreeMap;

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, JSONSchema};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};

use crate::types::{
    ConditioningIntensity, DiseaseType, DonorType, Gender, PredictionRequest, REQUEST_FIELDS,
};

/// Default maximum request payload size (64KB). A patient record is a few
/// hundred bytes.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Pseudo-field used when the body as a whole is unusable.
pub const BODY_FIELD: &str = "body";

const INTEGER_FIELDS: [&str; 5] = [
    "age",
    "comorbidity_score",
    "prior_transplants",
    "time_from_diagnosis_days",
    "treatment_days",
];

/// JSON Schema for the prediction request
pub static PREDICTION_REQUEST_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    let schema = json!({
        "type": "object",
        "required": REQUEST_FIELDS,
        "properties": {
            "age": { "type": "integer", "minimum": 18, "maximum": 80 },
            "gender": { "type": "string", "enum": Gender::labels() },
            "donor_type": { "type": "string", "enum": DonorType::labels() },
            "comorbidity_score": { "type": "integer", "minimum": 0, "maximum": 10 },
            "disease_type": { "type": "string", "enum": DiseaseType::labels() },
            "conditioning_intensity": { "type": "string", "enum": ConditioningIntensity::labels() },
            "prior_transplants": { "type": "integer", "minimum": 0, "maximum": 1 },
            "time_from_diagnosis_days": { "type": "integer", "minimum": 1, "maximum": 5000 },
            "treatment_days": { "type": "integer", "minimum": 1, "maximum": 365 }
        }
    });

    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema)
        .expect("prediction request schema is valid")
});

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Validation failure naming every offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid prediction request: {}", field_list(.violations))]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

fn field_list(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationError {
    pub fn body(message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation {
                field: BODY_FIELD.to_string(),
                message: message.into(),
            }],
        }
    }

    /// Offending field names in schema order.
    pub fn fields(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.field.clone()).collect()
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    fn from_map(map: BTreeMap<(usize, String), String>) -> Self {
        Self {
            violations: map
                .into_iter()
                .map(|((_, field), message)| FieldViolation { field, message })
                .collect(),
        }
    }
}

/// Parse a raw body into JSON. The size limit is enforced by the transport
/// layer (see [`payload_limit_config`]), not here.
pub fn parse_body(bytes: &[u8]) -> Result<Value, ValidationError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ValidationError::body("request body is not valid UTF-8"))?;

    serde_json::from_str::<Value>(text.trim())
        .map_err(|e| ValidationError::body(format!("invalid JSON: {}", e)))
}

/// Validate a parsed body and build the typed request.
pub fn validate(raw: &Value) -> Result<PredictionRequest, ValidationError> {
    let mut violations: BTreeMap<(usize, String), String> = BTreeMap::new();
    let mut reject = |field: &str, message: String| {
        violations.entry((field_rank(field), field.to_string())).or_insert(message);
    };

    if let Err(errors) = PREDICTION_REQUEST_SCHEMA.validate(raw) {
        for error in errors {
            let field = match &error.kind {
                ValidationErrorKind::Required { property } => property
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| property.to_string()),
                _ => top_level_field(&error.instance_path.to_string()),
            };
            reject(&field, error.to_string());
        }
    }

    // JSON Schema treats 45.0 as an integer; the request schema does not.
    if let Value::Object(obj) = raw {
        for field in INTEGER_FIELDS {
            if let Some(Value::Number(n)) = obj.get(field) {
                if n.as_i64().is_none() {
                    reject(field, format!("{} is not an integer", n));
                }
            }
        }
    }

    if !violations.is_empty() {
        return Err(ValidationError::from_map(violations));
    }

    serde_json::from_value::<PredictionRequest>(raw.clone())
        .map_err(|e| ValidationError::body(format!("request does not match schema: {}", e)))
}

fn top_level_field(pointer: &str) -> String {
    pointer
        .trim_start_matches('/')
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(BODY_FIELD)
        .to_string()
}

fn field_rank(field: &str) -> usize {
    REQUEST_FIELDS
        .iter()
        .position(|f| *f == field)
        .unwrap_or(REQUEST_FIELDS.len())
}

/// Generate middleware config for payload limits
pub fn payload_limit_config(max_bytes: usize) -> tower_http::limit::RequestBodyLimitLayer {
    tower_http::limit::RequestBodyLimitLayer::new(max_bytes)
}
