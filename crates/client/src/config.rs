//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `STOREFRONT_API_URL` - Backend base URL (default: `http://localhost:8000`)
//! - `STOREFRONT_TOKEN_FILE` - Where credentials are persisted (default: `.storefront-session.json`)
//! - `STOREFRONT_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `STOREFRONT_REFRESH_ON_UNAUTHORIZED` - Try the refresh token on 401 before logging out (default: true)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TOKEN_FILE: &str = ".storefront-session.json";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL; endpoint paths are joined onto it
    pub api_url: Url,
    /// Token file used by the CLI's persistent store
    pub token_file: PathBuf,
    /// Timeout applied to every HTTP request
    pub timeout: Duration,
    /// Exchange the refresh token on 401 before ending the session
    pub refresh_on_unauthorized: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl ClientConfig {
    /// Configuration pointing at `api_url` with every other setting defaulted.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `api_url` is not an absolute URL.
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_base_url("STOREFRONT_API_URL", api_url)?,
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            refresh_on_unauthorized: true,
            sentry_dsn: None,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = parse_base_url(
            "STOREFRONT_API_URL",
            &get_env_or_default("STOREFRONT_API_URL", DEFAULT_API_URL),
        )?;
        let token_file = PathBuf::from(get_env_or_default(
            "STOREFRONT_TOKEN_FILE",
            DEFAULT_TOKEN_FILE,
        ));
        let timeout_secs = get_env_or_default(
            "STOREFRONT_HTTP_TIMEOUT_SECS",
            &DEFAULT_TIMEOUT_SECS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_HTTP_TIMEOUT_SECS".to_string(), e.to_string())
        })?;
        let refresh_on_unauthorized = parse_bool(
            "STOREFRONT_REFRESH_ON_UNAUTHORIZED",
            &get_env_or_default("STOREFRONT_REFRESH_ON_UNAUTHORIZED", "true"),
        )?;

        Ok(Self {
            api_url,
            token_file,
            timeout: Duration::from_secs(timeout_secs),
            refresh_on_unauthorized,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }

    /// Replace the backend URL, e.g. from a command-line flag.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `api_url` is not an absolute URL.
    pub fn with_api_url(mut self, api_url: &str) -> Result<Self, ConfigError> {
        self.api_url = parse_base_url("STOREFRONT_API_URL", api_url)?;
        Ok(self)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse a base URL, forcing a trailing slash so `Url::join` keeps any path prefix.
fn parse_base_url(var_name: &str, value: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            "must be an absolute http(s) URL".to_string(),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_bool(var_name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("expected true or false, got '{other}'"),
        )),
    }
}
