//! Gateway service object and initialization.

use crate::adapter::{PostgrestAdapter, SharedAdapter};
use crate::cache::{CacheStats, SharedCache, TtlCache};
use crate::config::Config;
use crate::error::GatewayError;
use crate::resilience::RetryPolicy;
use crate::telemetry::{Metrics, MetricsAggregator, SharedMetrics};
use crate::tools::{catalog, OperationDescriptor};
use std::sync::Arc;
use tracing::info;

/// The tabular data gateway.
///
/// Cloning is cheap: the cache, metrics and adapter are shared via `Arc`,
/// so every clone observes the same process-wide state. Build one at
/// startup and hand clones to whatever drives [`Gateway::dispatch`].
#[derive(Clone)]
pub struct Gateway {
    /// Remote data service.
    pub(crate) adapter: SharedAdapter,

    /// Read-result cache.
    pub(crate) cache: SharedCache,

    /// Operational metrics.
    pub(crate) metrics: SharedMetrics,

    /// Configuration.
    pub(crate) config: Arc<Config>,
}

impl Gateway {
    /// Create a gateway over an existing adapter.
    pub fn new(adapter: SharedAdapter, config: Config) -> Self {
        let cache = Arc::new(TtlCache::from_config(&config.cache));

        info!(
            "Gateway initialized (adapter: {}, cache: {}, retry: {} attempts)",
            adapter.name(),
            if config.cache.enabled { "enabled" } else { "disabled" },
            config.retry.max_attempts
        );

        Self {
            adapter,
            cache,
            metrics: Arc::new(MetricsAggregator::new()),
            config: Arc::new(config),
        }
    }

    /// Create a gateway talking to the configured PostgREST endpoint.
    pub fn from_config(config: Config) -> Result<Self, GatewayError> {
        let adapter = PostgrestAdapter::new(&config.supabase)?;
        Ok(Self::new(Arc::new(adapter), config))
    }

    /// Load configuration from the environment and create the gateway.
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_config(Config::from_env()?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }

    pub fn adapter_name(&self) -> &'static str {
        self.adapter.name()
    }

    /// Current metrics.
    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    /// Current cache statistics.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Operation catalog for the protocol layer.
    pub fn catalog(&self) -> Vec<OperationDescriptor> {
        catalog()
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("adapter", &self.adapter.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_url() {
        let err = Gateway::from_config(Config::default()).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn test_postgrest_gateway() {
        let mut config = Config::default();
        config.supabase.url = "https://example.supabase.co".to_string();
        config.supabase.api_key = "anon".to_string();

        let gateway = Gateway::from_config(config).unwrap();
        assert_eq!(gateway.adapter_name(), "postgrest");
        assert_eq!(gateway.metrics().total_queries, 0);
        assert_eq!(gateway.catalog().len(), 10);

        let clone = gateway.clone();
        clone.metrics.record_cache_hit();
        assert_eq!(gateway.metrics().cache_hits, 1);
    }
}
