//! config-rs/lib.rs
//! Shared configuration utilities for the prediction services
//! Provides standardized functions for port/address management and
//! typed environment lookups with logged fallbacks

use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Load a `.env` file from the working directory if one exists and return
/// its path.
///
/// Missing files are not an error; variables already present in the
/// process environment always win. Nothing is logged here because callers
/// usually run this before a logger is installed.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenv::dotenv().ok()
}

/// Get service port from environment variables with proper fallback
///
/// # Arguments
/// * `service_name` - The name of the service (e.g., "PREDICTION")
/// * `default_port` - The default port to use if not specified in environment
///
/// # Returns
/// The port number to use for the service
pub fn get_service_port(service_name: &str, default_port: u16) -> u16 {
    let var_name = format!("{}_SERVICE_PORT", service_name.to_uppercase());
    env::var(&var_name)
        .unwrap_or_else(|_| default_port.to_string())
        .parse::<u16>()
        .unwrap_or_else(|_| {
            log::warn!("Invalid port in {}, using default {}", var_name, default_port);
            default_port
        })
}

/// Create a SocketAddr for binding a service
///
/// `<SERVICE>_SERVICE_ADDR` may hold a full `host:port` pair (optionally
/// prefixed with a scheme); otherwise the service binds on all interfaces
/// with the port from [`get_service_port`].
pub fn get_bind_address(service_name: &str, default_port: u16) -> SocketAddr {
    let var_name = format!("{}_SERVICE_ADDR", service_name.to_uppercase());

    if let Ok(addr_str) = env::var(&var_name) {
        let stripped = addr_str
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&addr_str);

        match stripped.parse::<SocketAddr>() {
            Ok(addr) => return addr,
            Err(_) => log::warn!("Invalid address format in {}, using default", var_name),
        }
    }

    let port = get_service_port(service_name, default_port);
    SocketAddr::from(([0, 0, 0, 0], port))
}

/// Get service name for logging and monitoring
pub fn get_formatted_service_name(service_name: &str) -> String {
    match service_name {
        "PREDICTION" => "prediction-gateway".to_string(),
        "AUDIT" => "audit-ledger".to_string(),
        _ => format!("{}-service", service_name.to_lowercase().replace('_', "-")),
    }
}

/// Read a typed value from the environment, falling back to `default`
/// when the variable is unset or fails to parse.
pub fn env_parse<T>(var_name: &str, default: T) -> T
where
    T: FromStr + Display,
    <T as FromStr>::Err: Display,
{
    match env::var(var_name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Invalid value {:?} in {}: {}; using default {}", raw, var_name, e, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Read a boolean flag. Accepts 1/true/yes/on and 0/false/no/off.
pub fn env_flag(var_name: &str, default: bool) -> bool {
    match env::var(var_name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                log::warn!("Invalid boolean {:?} in {}; using default {}", other, var_name, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Read a string value with a default.
pub fn env_string(var_name: &str, default: &str) -> String {
    env::var(var_name).unwrap_or_else(|_| default.to_string())
}

/// Read a filesystem path with a default.
pub fn env_path(var_name: &str, default: &str) -> PathBuf {
    env::var(var_name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_service_port() {
        std::env::set_var("PORTTEST_SERVICE_PORT", "9000");
        assert_eq!(get_service_port("PORTTEST", 8000), 9000);

        std::env::set_var("BADPORT_SERVICE_PORT", "not-a-port");
        assert_eq!(get_service_port("BADPORT", 8000), 8000);

        std::env::remove_var("UNKNOWN_SERVICE_PORT");
        assert_eq!(get_service_port("UNKNOWN", 8000), 8000);
    }

    #[test]
    fn test_get_bind_address() {
        std::env::set_var("BINDTEST_SERVICE_ADDR", "http://127.0.0.1:9100");
        assert_eq!(
            get_bind_address("BINDTEST", 8000),
            "127.0.0.1:9100".parse::<SocketAddr>().unwrap()
        );

        std::env::set_var("BINDPLAIN_SERVICE_ADDR", "127.0.0.1:9200");
        assert_eq!(get_bind_address("BINDPLAIN", 8000).port(), 9200);

        std::env::remove_var("BINDDEFAULT_SERVICE_ADDR");
        std::env::remove_var("BINDDEFAULT_SERVICE_PORT");
        assert_eq!(
            get_bind_address("BINDDEFAULT", 8000),
            "0.0.0.0:8000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_formatted_service_name() {
        assert_eq!(get_formatted_service_name("PREDICTION"), "prediction-gateway");
        assert_eq!(get_formatted_service_name("MODEL_STORE"), "model-store-service");
    }

    #[test]
    fn test_env_parse_and_flag() {
        std::env::set_var("CFGTEST_LIMIT", "25");
        assert_eq!(env_parse::<u32>("CFGTEST_LIMIT", 10), 25);

        std::env::set_var("CFGTEST_BAD_LIMIT", "lots");
        assert_eq!(env_parse::<u32>("CFGTEST_BAD_LIMIT", 10), 10);

        std::env::set_var("CFGTEST_FLAG", "Yes");
        assert!(env_flag("CFGTEST_FLAG", false));

        std::env::set_var("CFGTEST_BAD_FLAG", "maybe");
        assert!(!env_flag("CFGTEST_BAD_FLAG", false));

        std::env::remove_var("CFGTEST_MISSING");
        assert_eq!(env_string("CFGTEST_MISSING", "fallback"), "fallback");
    }
}
