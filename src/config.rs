//! Configuration management for the tabular gateway.
//!
//! Configuration is loaded from environment variables following the 12-factor app pattern.

use crate::constants::{
    DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL, DEFAULT_CACHE_TTL_MS, DEFAULT_PAGE_SIZE,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RETRY_BASE_DELAY_MS,
    DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_SCHEMA,
};
use crate::error::GatewayError;
use crate::resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote service connection
    pub supabase: SupabaseConfig,

    /// Read-result cache
    pub cache: CacheConfig,

    /// Retry behavior for remote calls
    pub retry: RetryPolicy,

    /// Query defaults
    pub query: QueryConfig,
}

/// Remote service connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,

    /// Service-role or anon key
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Schema reported by schema introspection
    pub schema: String,

    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_entries: usize,
}

/// Query defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Page size used when an offset is given without a limit
    pub default_page_size: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// ## Required
    /// - `SUPABASE_URL`: project URL
    /// - `SUPABASE_SERVICE_ROLE_KEY` or `SUPABASE_ANON_KEY`: API key
    ///
    /// ## Optional
    /// - `SUPABASE_SCHEMA`: schema for introspection (default: public)
    /// - `GATEWAY_CACHE_ENABLED`: enable the read cache (default: true)
    /// - `GATEWAY_CACHE_TTL_MS`: cache TTL in milliseconds (default: 300000)
    /// - `GATEWAY_CACHE_MAX_ENTRIES`: cache entry bound (default: 1000)
    /// - `GATEWAY_RETRY_MAX_ATTEMPTS`: attempts per remote call (default: 3)
    /// - `GATEWAY_RETRY_BASE_DELAY_MS`: backoff unit in milliseconds (default: 1000)
    /// - `GATEWAY_RETRY_TRANSIENT_ONLY`: retry only transient failures (default: true)
    /// - `GATEWAY_REQUEST_TIMEOUT_SECS`: HTTP timeout in seconds (default: 30)
    /// - `GATEWAY_DEFAULT_PAGE_SIZE`: page size for offset without limit (default: 10)
    pub fn from_env() -> Result<Self, GatewayError> {
        let url = std::env::var("SUPABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| GatewayError::config("SUPABASE_URL environment variable is required"))?;

        let api_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| std::env::var("SUPABASE_ANON_KEY").ok().filter(|v| !v.is_empty()))
            .ok_or_else(|| {
                GatewayError::config(
                    "Authentication required: set SUPABASE_SERVICE_ROLE_KEY or SUPABASE_ANON_KEY",
                )
            })?;

        let schema = std::env::var("SUPABASE_SCHEMA")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());

        let request_timeout_secs =
            env_parse("GATEWAY_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS);

        let cache_enabled = env_flag("GATEWAY_CACHE_ENABLED", true);
        let cache_ttl_ms = env_parse("GATEWAY_CACHE_TTL_MS", DEFAULT_CACHE_TTL_MS);
        let cache_max_entries = env_parse("GATEWAY_CACHE_MAX_ENTRIES", DEFAULT_CACHE_MAX_ENTRIES);

        let max_attempts = env_parse("GATEWAY_RETRY_MAX_ATTEMPTS", DEFAULT_RETRY_MAX_ATTEMPTS);
        let base_delay_ms = env_parse("GATEWAY_RETRY_BASE_DELAY_MS", DEFAULT_RETRY_BASE_DELAY_MS);
        let transient_only = env_flag("GATEWAY_RETRY_TRANSIENT_ONLY", true);

        let default_page_size = env_parse("GATEWAY_DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE);

        Ok(Config {
            supabase: SupabaseConfig {
                url,
                api_key,
                schema,
                request_timeout: Duration::from_secs(request_timeout_secs),
            },
            cache: CacheConfig {
                enabled: cache_enabled,
                ttl: Duration::from_millis(cache_ttl_ms),
                max_entries: cache_max_entries,
            },
            retry: RetryPolicy {
                max_attempts: max_attempts.max(1),
                base_delay: Duration::from_millis(base_delay_ms),
                transient_only,
            },
            query: QueryConfig {
                default_page_size: default_page_size.max(1),
            },
        })
    }
}

/// Parse an optional variable, falling back to `default` when absent or malformed.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| match v.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            schema: DEFAULT_SCHEMA.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_CACHE_TTL,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}
