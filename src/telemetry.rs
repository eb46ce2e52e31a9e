//! Operational metrics and request correlation.
//!
//! [`MetricsAggregator`] keeps the process-wide counters reported by the
//! `metrics` operation. The running average is updated incrementally on every
//! record and never recomputed from history.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Generate a short correlation ID (8 characters) for compact logging.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Correlation information carried through one dispatched call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub start_time: Instant,
    pub operation: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::with_correlation_id(generate_correlation_id())
    }

    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            start_time: Instant::now(),
            operation: None,
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Prefix for log lines belonging to this call.
    pub fn log_prefix(&self) -> String {
        match &self.operation {
            Some(op) => format!("[{}] [{}]", self.correlation_id, op),
            None => format!("[{}]", self.correlation_id),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics snapshot, serialized as returned by the `metrics` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    /// Running mean over `total_queries`, in milliseconds.
    pub average_response_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_query_time: Option<DateTime<Utc>>,
    /// Served from cache; not part of the totals above.
    pub cache_hits: u64,
}

impl Metrics {
    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total_queries == 0 {
            100.0
        } else {
            (self.successful_queries as f64 / self.total_queries as f64) * 100.0
        }
    }
}

/// Process-wide metrics, safe to share between concurrent dispatches.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    inner: Mutex<Metrics>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed remote operation that started at `started_at`.
    pub fn record(&self, started_at: Instant, succeeded: bool) {
        self.record_elapsed(started_at.elapsed(), succeeded);
    }

    /// Record a completed remote operation with a known duration.
    pub fn record_elapsed(&self, elapsed: Duration, succeeded: bool) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let mut metrics = self.inner.lock();

        metrics.total_queries += 1;
        if succeeded {
            metrics.successful_queries += 1;
        } else {
            metrics.failed_queries += 1;
        }

        let n = metrics.total_queries as f64;
        metrics.average_response_time =
            (metrics.average_response_time * (n - 1.0) + elapsed_ms) / n;
        metrics.last_query_time = Some(Utc::now());
    }

    /// Count a read served from cache.
    pub fn record_cache_hit(&self) {
        self.inner.lock().cache_hits += 1;
    }

    pub fn snapshot(&self) -> Metrics {
        self.inner.lock().clone()
    }
}

/// Shared metrics wrapper.
pub type SharedMetrics = Arc<MetricsAggregator>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_length() {
        let id = generate_correlation_id();
        assert_eq!(id.len(), 8);
        assert_ne!(id, generate_correlation_id());
    }

    #[test]
    fn test_log_prefix() {
        let ctx = RequestContext::with_correlation_id("abc12345").with_operation("query");
        assert_eq!(ctx.log_prefix(), "[abc12345] [query]");
        assert_eq!(RequestContext::with_correlation_id("x").log_prefix(), "[x]");
    }

    #[test]
    fn test_running_average_matches_mean() {
        let metrics = MetricsAggregator::new();
        let samples = [12.0, 7.5, 30.25, 0.0, 101.0];

        for (i, ms) in samples.iter().enumerate() {
            metrics.record_elapsed(Duration::from_secs_f64(ms / 1000.0), i % 2 == 0);
        }

        let snapshot = metrics.snapshot();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((snapshot.average_response_time - mean).abs() < 1e-6);
        assert_eq!(snapshot.total_queries, 5);
        assert_eq!(
            snapshot.total_queries,
            snapshot.successful_queries + snapshot.failed_queries
        );
        assert_eq!(snapshot.successful_queries, 3);
        assert!(snapshot.last_query_time.is_some());
    }

    #[test]
    fn test_cache_hits_leave_totals_alone() {
        let metrics = MetricsAggregator::new();
        metrics.record_cache_hit();
        metrics.record_cache_hit();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.total_queries, 0);
        assert_eq!(snapshot.average_response_time, 0.0);
        assert!(snapshot.last_query_time.is_none());
    }

    #[test]
    fn test_snapshot_shape() {
        let value = serde_json::to_value(MetricsAggregator::new().snapshot()).unwrap();
        assert_eq!(value["totalQueries"], 0);
        assert_eq!(value["averageResponseTime"], 0.0);
        assert!(value.get("lastQueryTime").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_measures_from_start() {
        let metrics = MetricsAggregator::new();
        let started = Instant::now();
        tokio::time::advance(Duration::from_millis(250)).await;
        metrics.record(started, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.failed_queries, 1);
        assert!((snapshot.average_response_time - 250.0).abs() < 1.0);
    }
}
