//! Configuration for the client services.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the brewing API
    pub api_url: String,
    /// Bearer token sent with every request
    pub api_token: Option<String>,
    /// Directory holding the persisted cache
    pub cache_dir: PathBuf,
    /// Identifier of this device in operation IDs
    pub node_id: String,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
    /// Minimum time between static-data version checks
    pub static_check_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("BREWSYNC_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingApiUrl)?;

        let api_token = lookup("BREWSYNC_API_TOKEN").filter(|v| !v.trim().is_empty());

        let cache_dir = PathBuf::from(
            lookup("BREWSYNC_CACHE_DIR").unwrap_or_else(|| ".brewsync".to_string()),
        );

        let node_id = lookup("BREWSYNC_NODE_ID")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        let http_timeout = lookup("BREWSYNC_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidTimeout)?;

        let static_check_interval = lookup("BREWSYNC_STATIC_CHECK_INTERVAL_SECS")
            .unwrap_or_else(|| "3600".to_string())
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidCheckInterval)?;

        Ok(Self {
            api_url,
            api_token,
            cache_dir,
            node_id,
            http_timeout,
            static_check_interval,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("BREWSYNC_API_URL environment variable is required")]
    MissingApiUrl,

    #[error("Invalid BREWSYNC_HTTP_TIMEOUT_SECS value")]
    InvalidTimeout,

    #[error("Invalid BREWSYNC_STATIC_CHECK_INTERVAL_SECS value")]
    InvalidCheckInterval,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[("BREWSYNC_API_URL", "https://api.test")]))
            .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from(".brewsync"));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.static_check_interval, Duration::from_secs(3600));
        assert!(config.api_token.is_none());
        assert_eq!(config.node_id.len(), 32);
    }

    #[test]
    fn api_url_is_required() {
        let result = Config::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(ConfigError::MissingApiUrl)));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("BREWSYNC_API_URL", "https://api.test"),
            ("BREWSYNC_HTTP_TIMEOUT_SECS", "soon"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidTimeout)));
    }
}
