// prediction-gateway-rs/src/main.rs
// HCT Survival Prediction Gateway
// Port 8000 - HTTP/REST entry point for external clients
//
// Implements:
// - Per-client sliding-window rate limiting
// - Schema-based request validation
// - Survival probability inference with global feature importances
// - Hash-chained audit ledger of every request attempt

use std::net::SocketAddr;
use std::sync::Arc;

use config_rs::get_formatted_service_name;
use prediction_gateway::config::{self, SERVICE_KEY};
use prediction_gateway::logging::init_logging;
use prediction_gateway::PredictionGateway;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let service_name = get_formatted_service_name(SERVICE_KEY);
    let config = config::load(|level, format| init_logging(&service_name, level, format));

    let gateway = Arc::new(PredictionGateway::from_config(&config));
    if !gateway.orchestrator().is_model_loaded() {
        tracing::warn!(
            model_path = %config.model_path.display(),
            "Starting without a model; /predict will answer 503"
        );
    }

    let app = gateway.create_router();

    let addr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        %addr,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window.as_secs(),
        audit_log = %config.audit_log_path.display(),
        "Prediction gateway starting"
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Prediction gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
