//! HCT survival prediction gateway.
//!
//! HTTP entry point in front of a pre-trained survival model. Every
//! `POST /predict` runs through the [`PredictionOrchestrator`]: rate limit,
//! validation, inference, audit, response.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod audit;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod predictor;
pub mod rate_limit;
pub mod types;
pub mod validation;

use audit::AuditLogger;
use config::GatewayConfig;
use orchestrator::PredictionOrchestrator;
use predictor::PredictorAdapter;
use rate_limit::RateLimiter;
use validation::payload_limit_config;

pub const SERVICE_NAME: &str = "prediction-gateway";

/// Identity used when neither the peer address nor a trusted header is known.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub timestamp: DateTime<Utc>,
    pub service: &'static str,
    pub uptime_seconds: u64,
    pub model_version: Option<String>,
}

/// Shared gateway state
pub struct PredictionGateway {
    orchestrator: PredictionOrchestrator,
    trust_forwarded_for: bool,
    request_timeout: Duration,
    max_payload_bytes: usize,
}

impl PredictionGateway {
    /// Wire the gateway around an existing orchestrator. Only the HTTP
    /// settings of `config` are used here.
    pub fn new(orchestrator: PredictionOrchestrator, config: &GatewayConfig) -> Self {
        Self {
            orchestrator,
            trust_forwarded_for: config.trust_forwarded_for,
            request_timeout: config.request_timeout,
            max_payload_bytes: config.max_payload_bytes,
        }
    }

    /// Load the model and open the audit ledger described by `config`.
    /// Neither failure is fatal: the gateway starts degraded instead.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let predictor = PredictorAdapter::load(&config.model_path);
        let audit = AuditLogger::open(&config.audit_log_path, config.audit_include_input);
        let limiter = RateLimiter::new(config.rate_limit.clone());
        let orchestrator =
            PredictionOrchestrator::new(limiter, predictor, audit, config.pipeline.clone());

        Self::new(orchestrator, config)
    }

    pub fn orchestrator(&self) -> &PredictionOrchestrator {
        &self.orchestrator
    }

    /// Create the Axum router with all routes and middleware
    pub fn create_router(self: Arc<Self>) -> Router {
        let timeout = self.request_timeout;
        let limit = self.max_payload_bytes;

        Router::new()
            .route("/", get(Self::root_handler))
            .route("/health", get(Self::health_handler))
            .route("/predict", post(Self::predict_handler))
            .route("/metrics", get(Self::metrics_handler))
            .layer(payload_limit_config(limit))
            .layer(TimeoutLayer::new(timeout))
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    async fn root_handler() -> impl IntoResponse {
        Json(serde_json::json!({
            "service": "HCT Survival Prediction Gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": [
                "GET /health",
                "POST /predict",
                "GET /metrics"
            ]
        }))
    }

    async fn health_handler(State(state): State<Arc<Self>>) -> impl IntoResponse {
        let orchestrator = &state.orchestrator;
        let model_loaded = orchestrator.is_model_loaded();

        Json(HealthResponse {
            status: if model_loaded { "healthy" } else { "degraded" },
            model_loaded,
            timestamp: Utc::now(),
            service: SERVICE_NAME,
            uptime_seconds: orchestrator.metrics().uptime_seconds(),
            model_version: orchestrator.model_version().map(str::to_string),
        })
    }

    async fn metrics_handler(State(state): State<Arc<Self>>) -> impl IntoResponse {
        Json(state.orchestrator.metrics_snapshot())
    }

    async fn predict_handler(
        State(state): State<Arc<Self>>,
        connect_info: Option<ConnectInfo<SocketAddr>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let peer = connect_info.map(|ConnectInfo(addr)| addr);
        let client_id = client_identity(peer, &headers, state.trust_forwarded_for);

        match state.orchestrator.handle(&client_id, &body).await {
            Ok(response) => Json(response).into_response(),
            Err(err) => err.into_response(),
        }
    }
}

/// Resolve the rate-limit identity for a request.
///
/// The peer IP is used by default. With `trust_forwarded_for` the first
/// `X-Forwarded-For` entry takes precedence.
pub fn client_identity(
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Some(forwarded) = forwarded {
            return forwarded.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}
