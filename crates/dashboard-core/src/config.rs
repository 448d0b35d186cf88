//! Environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DashError, Result};

/// API base URL.
pub const ENV_API_URL: &str = "DASHBOARD_API_URL";
/// Whether requests carry a bearer token.
pub const ENV_AUTH_ENABLED: &str = "DASHBOARD_AUTH_ENABLED";
/// Path of the token file written by the authentication provider.
pub const ENV_TOKEN_PATH: &str = "DASHBOARD_TOKEN_PATH";
/// Default cache freshness window, in seconds.
pub const ENV_CACHE_TTL_SECS: &str = "DASHBOARD_CACHE_TTL_SECS";
/// Default polling interval, in seconds.
pub const ENV_POLL_SECS: &str = "DASHBOARD_POLL_SECS";
/// HTTP timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "DASHBOARD_TIMEOUT_SECS";

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings the data layer reads from its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    /// Base URL every request path is joined to, without a trailing slash.
    pub api_base_url: String,
    /// When false the gateway never attaches a bearer token.
    pub auth_enabled: bool,
    /// Token file location, if tokens are read from disk.
    pub token_path: Option<PathBuf>,
    /// Freshness window used when a query does not pick its own.
    pub cache_ttl: Duration,
    /// Refetch interval for polled queries.
    pub poll_interval: Duration,
    /// Transport timeout for one request.
    pub request_timeout: Duration,
}

impl DashboardConfig {
    /// Creates a configuration with defaults for everything but the base URL.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            auth_enabled: true,
            token_path: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_API_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| DashError::Config(format!("{ENV_API_URL} is not set")))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DashError::Config(format!(
                "{ENV_API_URL} must be an http(s) URL, got {url}"
            )));
        }

        let mut config = Self::new(url.trim());

        if let Some(raw) = lookup(ENV_AUTH_ENABLED) {
            config.auth_enabled = parse_bool(ENV_AUTH_ENABLED, &raw)?;
        }
        config.token_path = lookup(ENV_TOKEN_PATH)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        if let Some(raw) = lookup(ENV_CACHE_TTL_SECS) {
            config.cache_ttl = parse_secs(ENV_CACHE_TTL_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_POLL_SECS) {
            config.poll_interval = parse_secs(ENV_POLL_SECS, &raw)?;
            if config.poll_interval.is_zero() {
                return Err(DashError::Config(format!("{ENV_POLL_SECS} must be positive")));
            }
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            config.request_timeout = parse_secs(ENV_TIMEOUT_SECS, &raw)?;
            if config.request_timeout.is_zero() {
                return Err(DashError::Config(format!("{ENV_TIMEOUT_SECS} must be positive")));
            }
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DashError::Config(format!("{key}: expected a boolean, got {other}"))),
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| DashError::Config(format!("{key}: {e}")))
}
