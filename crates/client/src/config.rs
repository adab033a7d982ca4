//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `LUXUS_API_URL` - API base URL (default: `http://localhost:5000/api`)
//! - `LUXUS_API_TIMEOUT_SECS` - Per-call timeout (default: 10)
//! - `LUXUS_RETRY_MAX_ATTEMPTS` - Attempts for transient failures (default: 3)
//! - `LUXUS_RETRY_BASE_DELAY_MS` - First backoff delay (default: 200)
//! - `LUXUS_RETRY_MAX_DELAY_MS` - Backoff cap (default: 2000)
//! - `LUXUS_CACHE_TTL_SECS` - Catalog response cache TTL (default: 300)
//! - `LUXUS_CART_POLICY` - `unique` or `stocked` (default: `unique`)
//! - `LUXUS_FREE_SHIPPING_THRESHOLD` - Subtotal for free shipping (default: 150)
//! - `LUXUS_SHIPPING_FEE` - Flat fee below the threshold (default: 15)
//! - `LUXUS_STORAGE_DIR` - Directory for persisted state (default: in-memory)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use luxus_core::{CartPolicy, ShippingRule};
use rust_decimal::Decimal;
use thiserror::Error;
use url::Url;

use crate::gateway::RetryPolicy;

const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Session layer configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, without a trailing slash
    pub api_url: String,
    /// Timeout for a single HTTP attempt
    pub timeout: Duration,
    /// Backoff policy for transient failures
    pub retry: RetryPolicy,
    /// Time-to-live of cached catalog responses
    pub cache_ttl: Duration,
    /// Behavior of repeated cart adds
    pub cart_policy: CartPolicy,
    /// Shipping cost derivation
    pub shipping: ShippingRule,
    /// Directory for persisted state; `None` keeps state in memory
    pub storage_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Configuration for `api_url` with every other setting at its default.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` (attributed to `LUXUS_API_URL`)
    /// if `api_url` is not an absolute http(s) URL.
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: validate_api_url(api_url)?,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(300),
            cart_policy: CartPolicy::default(),
            shipping: ShippingRule::default(),
            storage_dir: None,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let mut config = Self::new(&get_env_or_default("LUXUS_API_URL", DEFAULT_API_URL))?;

        if let Some(secs) = parse_optional_env::<u64>("LUXUS_API_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_optional_env::<u32>("LUXUS_RETRY_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(ConfigError::InvalidEnvVar(
                    "LUXUS_RETRY_MAX_ATTEMPTS".to_string(),
                    "must be at least 1".to_string(),
                ));
            }
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_optional_env::<u64>("LUXUS_RETRY_BASE_DELAY_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_optional_env::<u64>("LUXUS_RETRY_MAX_DELAY_MS")? {
            config.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_optional_env::<u64>("LUXUS_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(policy) = parse_optional_env::<CartPolicy>("LUXUS_CART_POLICY")? {
            config.cart_policy = policy;
        }
        if let Some(threshold) = parse_optional_env::<Decimal>("LUXUS_FREE_SHIPPING_THRESHOLD")? {
            config.shipping.free_shipping_threshold = threshold;
        }
        if let Some(fee) = parse_optional_env::<Decimal>("LUXUS_SHIPPING_FEE")? {
            config.shipping.flat_fee = fee;
        }
        config.storage_dir = get_optional_env("LUXUS_STORAGE_DIR").map(PathBuf::from);

        Ok(config)
    }

    /// Absolute URL for an API path (`/users/auth` → `<api_url>/users/auth`).
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an optional environment variable, failing only if it is set and
/// malformed.
fn parse_optional_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
        .transpose()
}

/// Check that the API URL is absolute http(s) and strip the trailing slash.
fn validate_api_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar("LUXUS_API_URL".to_string(), reason);
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}
