//! Structured logging setup.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LogFormat;

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Calling this more than once is a no-op. `log` records (from the shared
/// config helpers) are forwarded into tracing.
pub fn init_logging(service_name: &str, level: &str, format: &LogFormat) {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", level)));

    let registry = Registry::default().with(filter);
    let result = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    match result {
        Ok(()) => tracing::info!(
            service = %service_name,
            level = %level,
            json = *format == LogFormat::Json,
            "Structured logging initialized"
        ),
        Err(e) => eprintln!("Failed to set global subscriber: {}", e),
    }
}
