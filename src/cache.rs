//! Read-result caching with a fixed time-to-live.
//!
//! Entries are keyed by a canonical request fingerprint (see [`fingerprint`]).
//! Expiry is lazy: a stale entry is dropped when a lookup finds it, and
//! [`TtlCache::sweep`] clears the rest once per dispatch. There is no sliding
//! expiration and no background timer.

use crate::config::CacheConfig;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Cache entry: an opaque result and the moment it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    /// Stale once `now - stored_at >= ttl`.
    pub fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }

    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed for staleness or to make room.
    pub evictions: u64,
    pub entry_count: usize,
}

impl CacheStats {
    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// In-memory TTL cache for read results.
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    stats: RwLock<CacheStats>,
    default_ttl: Duration,
    max_entries: usize,
    enabled: bool,
}

impl TtlCache {
    pub fn new(default_ttl: Duration, max_entries: usize, enabled: bool) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            default_ttl,
            max_entries,
            enabled,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl, config.max_entries, config.enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a fresh value. A stale entry is removed and reported as absent.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if !self.enabled {
            return None;
        }

        let mut entries = self.entries.write().await;
        let mut stats = self.stats.write().await;

        match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                stats.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                stats.misses += 1;
                stats.evictions += 1;
                None
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Store a value under the default TTL.
    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    /// Store a value, replacing any previous entry for the key.
    pub async fn set_with_ttl(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        if !self.enabled || self.max_entries == 0 {
            return;
        }

        let key = key.into();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let mut evicted = remove_expired(&mut entries);
            while entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.stored_at)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        entries.remove(&k);
                        evicted += 1;
                    }
                    None => break,
                }
            }
            self.stats.write().await.evictions += evicted as u64;
        }

        entries.insert(key, CacheEntry::new(value, ttl));
    }

    /// Remove every stale entry. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let evicted = remove_expired(&mut entries);
        if evicted > 0 {
            self.stats.write().await.evictions += evicted as u64;
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let mut stats = self.stats.read().await.clone();
        stats.entry_count = entries.len();
        stats
    }
}

/// Shared cache wrapper.
pub type SharedCache = Arc<TtlCache>;

fn remove_expired(entries: &mut HashMap<String, CacheEntry>) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired());
    before - entries.len()
}

/// Cache key for an operation and its parameters: `op:<canonical JSON>`.
///
/// Object fields are emitted in sorted order at every depth, so parameter sets
/// that differ only in field order share a key. Array order is significant.
pub fn fingerprint(operation: &str, params: &Value) -> String {
    let mut key = String::with_capacity(operation.len() + 64);
    key.push_str(operation);
    key.push(':');
    write_canonical(params, &mut key);
    key
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, field)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::advance;

    fn cache(ttl_ms: u64, max_entries: usize) -> TtlCache {
        TtlCache::new(Duration::from_millis(ttl_ms), max_entries, true)
    }

    #[test]
    fn test_fingerprint_ignores_field_order() {
        let a = json!({
            "table": "users",
            "filters": [{"column": "age", "operator": "gte", "value": 18}]
        });
        let b = json!({
            "filters": [{"value": 18, "operator": "gte", "column": "age"}],
            "table": "users"
        });
        assert_eq!(fingerprint("query", &a), fingerprint("query", &b));
    }

    #[test]
    fn test_fingerprint_distinguishes_values() {
        let a = json!({"table": "users", "limit": 10});
        let b = json!({"table": "users", "limit": 11});
        assert_ne!(fingerprint("query", &a), fingerprint("query", &b));
        assert_ne!(fingerprint("query", &a), fingerprint("count", &a));

        let ordered = json!({"filters": [1, 2]});
        let reversed = json!({"filters": [2, 1]});
        assert_ne!(fingerprint("query", &ordered), fingerprint("query", &reversed));
    }

    #[test]
    fn test_fingerprint_format() {
        let key = fingerprint("query", &json!({"b": "x\"y", "a": [true, null]}));
        assert_eq!(key, r#"query:{"a":[true,null],"b":"x\"y"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness_boundary() {
        let cache = cache(300_000, 10);
        cache.set("k", json!({"data": [1]})).await;

        advance(Duration::from_millis(299_999)).await;
        assert_eq!(cache.get("k").await, Some(json!({"data": [1]})));

        advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hits_do_not_extend_lifetime() {
        let cache = cache(1000, 10);
        cache.set("k", json!(1)).await;

        advance(Duration::from_millis(600)).await;
        assert!(cache.get("k").await.is_some());

        advance(Duration::from_millis(400)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_stale() {
        let cache = cache(1000, 10);
        cache.set("old", json!(1)).await;
        advance(Duration::from_millis(500)).await;
        cache.set("new", json!(2)).await;
        advance(Duration::from_millis(500)).await;

        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("new").await.is_some());
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cache_evicts_oldest() {
        let cache = cache(60_000, 2);
        cache.set("a", json!(1)).await;
        advance(Duration::from_millis(10)).await;
        cache.set("b", json!(2)).await;
        advance(Duration::from_millis(10)).await;
        cache.set("c", json!(3)).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn test_replace_existing_key_when_full() {
        let cache = cache(60_000, 1);
        cache.set("a", json!(1)).await;
        cache.set("a", json!(2)).await;
        assert_eq!(cache.get("a").await, Some(json!(2)));
        assert_eq!(cache.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_stores() {
        let cache = TtlCache::new(Duration::from_secs(60), 10, false);
        cache.set("k", json!(1)).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let cache = cache(60_000, 10);
        cache.set("k", json!(1)).await;
        cache.get("k").await;
        cache.get("missing").await;

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert!((stats.hit_rate() - 50.0).abs() < 0.01);
    }
}
