//! Gateway configuration loaded from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use config_rs::{env_flag, env_parse, env_path, env_string, get_bind_address};

use crate::orchestrator::{PipelineSettings, DEFAULT_THRESHOLD, DEFAULT_TOP_K};
use crate::rate_limit::{
    RateLimitConfig, DEFAULT_MAX_REQUESTS, DEFAULT_MAX_TRACKED_CLIENTS, DEFAULT_WINDOW_SECS,
};
use crate::validation::MAX_PAYLOAD_SIZE;

pub const SERVICE_KEY: &str = "PREDICTION";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MODEL_PATH: &str = "model/model.json";
pub const DEFAULT_AUDIT_LOG_PATH: &str = "data/audit/predictions.jsonl";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "text" | "pretty" => Some(LogFormat::Text),
            _ => None,
        }
    }
}

/// `LOG_LEVEL` and `LOG_FORMAT`, read without logging so they can be used to
/// install the subscriber. Unknown formats fall back to JSON silently here;
/// [`GatewayConfig::from_env`] reports them once logging is up.
pub fn log_settings_from_env() -> (String, LogFormat) {
    let level = env_string("LOG_LEVEL", "info");
    let format = LogFormat::from_label(&env_string("LOG_FORMAT", "json")).unwrap_or(LogFormat::Json);
    (level, format)
}

/// Load `.env`, hand the logging settings to `init_logging`, then read the
/// rest of the configuration so its fallback warnings reach the installed
/// logger.
pub fn load<F>(init_logging: F) -> GatewayConfig
where
    F: FnOnce(&str, &LogFormat),
{
    let dotenv = config_rs::load_dotenv();
    let (level, format) = log_settings_from_env();
    init_logging(&level, &format);

    if let Some(path) = dotenv {
        log::debug!("Loaded environment overrides from {}", path.display());
    }

    GatewayConfig::from_env()
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub model_path: PathBuf,
    pub audit_log_path: PathBuf,
    pub audit_include_input: bool,
    pub rate_limit: RateLimitConfig,
    pub pipeline: PipelineSettings,
    pub request_timeout: Duration,
    pub max_payload_bytes: usize,
    /// Use the first `X-Forwarded-For` entry as the client identity.
    pub trust_forwarded_for: bool,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            audit_log_path: PathBuf::from(DEFAULT_AUDIT_LOG_PATH),
            audit_include_input: false,
            rate_limit: RateLimitConfig::default(),
            pipeline: PipelineSettings::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_payload_bytes: MAX_PAYLOAD_SIZE,
            trust_forwarded_for: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl GatewayConfig {
    /// Build the configuration from environment variables. Invalid values
    /// fall back to their defaults with a warning.
    pub fn from_env() -> Self {
        let mut max_requests = env_parse("RATE_LIMIT_MAX_REQUESTS", DEFAULT_MAX_REQUESTS);
        if max_requests == 0 {
            log::warn!("RATE_LIMIT_MAX_REQUESTS must be positive; using {}", DEFAULT_MAX_REQUESTS);
            max_requests = DEFAULT_MAX_REQUESTS;
        }

        let mut window_secs = env_parse("RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS);
        if window_secs == 0 {
            log::warn!("RATE_LIMIT_WINDOW_SECS must be positive; using {}", DEFAULT_WINDOW_SECS);
            window_secs = DEFAULT_WINDOW_SECS;
        }

        let mut threshold = env_parse("PREDICTION_THRESHOLD", DEFAULT_THRESHOLD);
        if !(0.0..=1.0).contains(&threshold) {
            log::warn!("PREDICTION_THRESHOLD must lie in [0, 1]; using {}", DEFAULT_THRESHOLD);
            threshold = DEFAULT_THRESHOLD;
        }

        let raw_format = env_string("LOG_FORMAT", "json");
        let log_format = LogFormat::from_label(&raw_format).unwrap_or_else(|| {
            log::warn!("Unknown LOG_FORMAT {:?}; using json", raw_format);
            LogFormat::Json
        });

        Self {
            bind_addr: get_bind_address(SERVICE_KEY, DEFAULT_PORT),
            model_path: env_path("MODEL_PATH", DEFAULT_MODEL_PATH),
            audit_log_path: env_path("AUDIT_LOG_PATH", DEFAULT_AUDIT_LOG_PATH),
            audit_include_input: env_flag("AUDIT_INCLUDE_INPUT", false),
            rate_limit: RateLimitConfig {
                max_requests,
                window: Duration::from_secs(window_secs),
                max_tracked_clients: env_parse("RATE_LIMIT_MAX_CLIENTS", DEFAULT_MAX_TRACKED_CLIENTS)
                    .max(1),
            },
            pipeline: PipelineSettings {
                threshold,
                top_k: env_parse("IMPORTANCE_TOP_K", DEFAULT_TOP_K),
            },
            request_timeout: Duration::from_secs(
                env_parse("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS).max(1),
            ),
            max_payload_bytes: env_parse("MAX_PAYLOAD_BYTES", MAX_PAYLOAD_SIZE).max(1),
            trust_forwarded_for: env_flag("TRUST_FORWARDED_FOR", false),
            log_level: env_string("LOG_LEVEL", "info"),
            log_format,
        }
    }
}
