//! Synchronizer configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `VOLTSHOP_API_URL` - Base URL of the account API (default: `http://127.0.0.1:8080/api`)
//! - `VOLTSHOP_API_TOKEN` - Bearer token for the signed-in account; absent means guest mode
//! - `VOLTSHOP_CACHE_DIR` - Directory for the durable guest cache (default: `.voltshop`)
//! - `VOLTSHOP_PRODUCT_ID_LENGTH` - Expected product ID length (default: 24)
//! - `VOLTSHOP_REQUEST_TIMEOUT_SECS` - HTTP request timeout (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;
use voltshop_core::ProductIdFormat;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api";
const DEFAULT_CACHE_DIR: &str = ".voltshop";
const DEFAULT_REQUEST_TIMEOUT_SECS: &str = "10";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Synchronizer configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Account API configuration
    pub api: ApiConfig,
    /// Directory holding the durable guest cache
    pub cache_dir: PathBuf,
    /// Product ID format enforced on cached and remote entries
    pub product_id_format: ProductIdFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Account API configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://shop.example.com/api`
    pub base_url: Url,
    /// Bearer token of the signed-in account (None in guest mode)
    pub token: Option<SecretString>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api = ApiConfig::from_env()?;
        let cache_dir = PathBuf::from(get_env_or_default("VOLTSHOP_CACHE_DIR", DEFAULT_CACHE_DIR));

        let product_id_length = get_env_or_default("VOLTSHOP_PRODUCT_ID_LENGTH", "24")
            .parse::<usize>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("VOLTSHOP_PRODUCT_ID_LENGTH".to_string(), e.to_string())
            })?;
        if product_id_length == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "VOLTSHOP_PRODUCT_ID_LENGTH".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            api,
            cache_dir,
            product_id_format: ProductIdFormat::new(product_id_length),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }

    /// Whether a signed-in account is configured.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.api.token.is_some()
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = parse_base_url(&get_env_or_default("VOLTSHOP_API_URL", DEFAULT_API_URL))?;

        let token = get_optional_env("VOLTSHOP_API_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);

        let timeout_secs =
            get_env_or_default("VOLTSHOP_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)
                .parse::<u64>()
                .map_err(|e| {
                    ConfigError::InvalidEnvVar(
                        "VOLTSHOP_REQUEST_TIMEOUT_SECS".to_string(),
                        e.to_string(),
                    )
                })?;

        Ok(Self {
            base_url,
            token,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse the API base URL, requiring an http(s) scheme.
fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar("VOLTSHOP_API_URL".to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "VOLTSHOP_API_URL".to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    Ok(url)
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
