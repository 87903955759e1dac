//! Configuration module for environment variable parsing.
//!
//! All three binaries share one `Config`; each reads the fields it needs and
//! supplies its own default port.

use std::env;
use std::path::PathBuf;

use tracing::warn;

/// Default relay port for `whr-router`.
pub const ROUTER_PORT: u16 = 8080;
/// Default port for `whr-config`.
pub const CONFIG_SERVER_PORT: u16 = 8081;
/// Default port for `whr-firewall`.
pub const FIREWALL_PORT: u16 = 8082;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind to
    pub host: String,

    /// Port for the web server to listen on
    pub port: u16,

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Accept the `user` header as identity instead of verifying tokens
    pub debug: bool,

    /// Identity used in debug mode when no `user` header is sent
    pub debug_user: String,

    /// Required hosted domain (`hd` claim) for Google identities
    pub allowed_domain: Option<String>,

    /// Google OAuth userinfo endpoint
    pub google_userinfo_url: String,

    /// Sanger OAuth userinfo endpoint
    pub sanger_userinfo_url: String,

    /// Origin of the front end allowed through CORS
    pub front_end: Option<String>,

    // =========================================================================
    // Relay
    // =========================================================================

    /// Base URL of the config server used to resolve tokens
    pub config_server_url: String,

    /// Upstream request timeout in milliseconds
    pub relay_timeout_ms: u64,

    /// Relays running longer than this are logged as long running
    pub warning_delay_ms: u64,

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Elasticsearch base URL holding relay logs
    pub elasticsearch_url: String,

    /// Optional basic auth user for Elasticsearch
    pub elasticsearch_user: Option<String>,

    /// Optional basic auth password for Elasticsearch
    pub elasticsearch_password: Option<String>,

    /// Index the relay logs are shipped into
    pub elasticsearch_index: String,

    // =========================================================================
    // Storage
    // =========================================================================

    /// JSON snapshot of the route registry, in-memory only when unset
    pub store_path: Option<PathBuf>,

    /// Firewall rule set document
    pub firewall_config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `default_port` is used when `PORT` is unset or malformed.
    pub fn from_env(default_port: u16) -> Self {
        Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: parse_or("PORT", default_port),

            debug: parse_bool("DEBUG"),

            debug_user: env::var("DEBUG_USER")
                .unwrap_or_else(|_| "test_user@example.com".to_string()),

            allowed_domain: non_empty("AUTH_ALLOWED_DOMAIN"),

            google_userinfo_url: env::var("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/oauth2/v2/userinfo".to_string()),

            sanger_userinfo_url: env::var("SANGER_USERINFO_URL")
                .unwrap_or_else(|_| "https://www.sanger.ac.uk/oa2/Info".to_string()),

            front_end: non_empty("FRONT_END"),

            config_server_url: env::var("CONFIG_SERVER_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| format!("http://127.0.0.1:{}", CONFIG_SERVER_PORT)),

            relay_timeout_ms: parse_or("RELAY_TIMEOUT_MS", 30_000),

            warning_delay_ms: parse_or("WARNING_DELAY_MS", 10_000),

            elasticsearch_url: env::var("ELASTICSEARCH_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://elasticsearch:9200".to_string()),

            elasticsearch_user: non_empty("ELASTICSEARCH_USER"),

            elasticsearch_password: non_empty("ELASTICSEARCH_PASSWORD"),

            elasticsearch_index: env::var("ELASTICSEARCH_INDEX")
                .unwrap_or_else(|_| "whr_routing_server".to_string()),

            store_path: non_empty("STORE_PATH").map(PathBuf::from),

            firewall_config_path: env::var("FIREWALL_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.json")),
        }
    }
}

/// Parse a variable, warning and falling back to `default` on bad input.
fn parse_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(env_var = name, value = %raw, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Truthy values are `1`, `true`, `yes` and `on`, case-insensitive.
fn parse_bool(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
