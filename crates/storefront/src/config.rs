//! Storefront client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional:
//! - `BAZAAR_API_URL` - Backend base URL (default: `http://localhost:8000`)
//! - `BAZAAR_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `BAZAAR_PRODUCT_CACHE_TTL_SECS` - Product cache TTL (default: 300)
//! - `BAZAAR_PRODUCT_CACHE_CAPACITY` - Product cache size (default: 1000)
//! - `BAZAAR_CART_FETCH_CONCURRENCY` - Parallel product fetches during cart load (default: 8)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_CAPACITY: u64 = 1000;
const DEFAULT_CART_FETCH_CONCURRENCY: usize = 8;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Invalid API URL {0}: {1}")]
    InvalidApiUrl(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Backend base URL; request paths are joined onto it
    pub api_url: Url,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
    /// Product cache configuration
    pub product_cache: ProductCacheConfig,
    /// Maximum concurrent product snapshot fetches while loading the cart
    pub cart_fetch_concurrency: usize,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Product read cache settings.
#[derive(Debug, Clone, Copy)]
pub struct ProductCacheConfig {
    /// Time-to-live for cached products
    pub ttl: Duration,
    /// Maximum number of cached entries
    pub capacity: u64,
}

impl Default for ProductCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl StorefrontConfig {
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

        let api_url = parse_api_url(&get_env_or_default("BAZAAR_API_URL", DEFAULT_API_URL))?;
        let timeout_secs: u64 = get_parsed_or_default("BAZAAR_HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let ttl_secs: u64 =
            get_parsed_or_default("BAZAAR_PRODUCT_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?;
        let capacity: u64 =
            get_parsed_or_default("BAZAAR_PRODUCT_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?;
        let cart_fetch_concurrency: usize = get_parsed_or_default(
            "BAZAAR_CART_FETCH_CONCURRENCY",
            DEFAULT_CART_FETCH_CONCURRENCY,
        )?;

        if cart_fetch_concurrency == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BAZAAR_CART_FETCH_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            api_url,
            request_timeout: Duration::from_secs(timeout_secs),
            product_cache: ProductCacheConfig {
                ttl: Duration::from_secs(ttl_secs),
                capacity,
            },
            cart_fetch_concurrency,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Configuration pointing at `api_url` with every other setting defaulted.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidApiUrl` if `api_url` is not an http(s) URL.
    pub fn for_api_url(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_api_url(api_url)?,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            product_cache: ProductCacheConfig::default(),
            cart_fetch_concurrency: DEFAULT_CART_FETCH_CONCURRENCY,
            sentry_dsn: None,
            sentry_environment: None,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse and normalize the API base URL.
///
/// A trailing slash is ensured so that `Url::join` appends paths instead of
/// replacing the last segment.
fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidApiUrl(raw.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidApiUrl(
            raw.to_string(),
            "scheme must be http or https".to_string(),
        ));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}
