//! Time-bounded cache in front of resource store searches.
//!
//! Keys combine the resource type with the canonicalized (sorted) query
//! parameters, so two logically identical searches hit the same entry.
//! Entries expire after a fixed TTL and are dropped lazily on access.
//! Writes to a resource type invalidate every entry for that type.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use carebridge_core::ResourceType;
use dashmap::DashMap;
use serde_json::Value;

use crate::traits::SearchParams;

/// Default TTL for cached search results.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache key: resource type plus canonical parameter string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource_type: String,
    params: String,
}

impl CacheKey {
    /// Build a key from a resource type and its search parameters.
    ///
    /// `SearchParams` is a `BTreeMap`, so iteration order is already
    /// sorted and the canonical form is stable.
    pub fn new(resource_type: &ResourceType, params: &SearchParams) -> Self {
        let params = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        Self {
            resource_type: resource_type.to_string(),
            params,
        }
    }

    /// The resource type this key belongs to.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }
}

struct CachedEntry {
    /// Records wrapped in Arc for cheap cloning on cache hits.
    records: Arc<Vec<Value>>,
    inserted_at: Instant,
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of entries currently in the cache.
    pub size: usize,
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries evicted due to TTL expiration.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Thread-safe TTL cache over search results.
pub struct SearchCache {
    entries: DashMap<CacheKey, CachedEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl SearchCache {
    /// Create a cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get an unexpired entry, dropping it if it has aged out.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<Value>>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(Arc::clone(&entry.records));
            }
            drop(entry);
            self.entries.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a fresh entry, returning the shared records for the caller.
    pub fn insert(&self, key: CacheKey, records: Vec<Value>) -> Arc<Vec<Value>> {
        let records = Arc::new(records);
        self.entries.insert(
            key,
            CachedEntry {
                records: Arc::clone(&records),
                inserted_at: Instant::now(),
            },
        );
        records
    }

    /// Remove every entry for one resource type. Returns how many were dropped.
    pub fn invalidate_type(&self, resource_type: &ResourceType) -> usize {
        let name = resource_type.to_string();
        let before = self.entries.len();
        self.entries.retain(|key, _| key.resource_type() != name);
        before - self.entries.len()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(rt: &str, pairs: &[(&str, &str)]) -> CacheKey {
        let rt: ResourceType = rt.parse().unwrap();
        let params: SearchParams = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CacheKey::new(&rt, &params)
    }

    #[test]
    fn test_key_canonicalization_is_order_independent() {
        let a = key("Patient", &[("status", "active"), ("_count", "10")]);
        let b = key("Patient", &[("_count", "10"), ("status", "active")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = SearchCache::new(Duration::from_secs(300));
        let k = key("Patient", &[]);
        cache.insert(k.clone(), vec![json!({"id": "1"})]);

        let hit = cache.get(&k).unwrap();
        assert_eq!(hit.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_expiry_after_ttl() {
        let cache = SearchCache::new(Duration::from_millis(20));
        let k = key("Patient", &[]);
        cache.insert(k.clone(), vec![json!({"id": "1"})]);

        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get(&k).is_none());

        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_invalidate_only_one_type() {
        let cache = SearchCache::default();
        cache.insert(key("Patient", &[]), vec![json!({"id": "p"})]);
        cache.insert(key("Observation", &[]), vec![json!({"id": "o"})]);

        let dropped = cache.invalidate_type(&"Patient".parse().unwrap());
        assert_eq!(dropped, 1);
        assert!(cache.get(&key("Patient", &[])).is_none());
        assert!(cache.get(&key("Observation", &[])).is_some());
    }

    #[test]
    fn test_clear_removes_everything() {
        let cache = SearchCache::default();
        cache.insert(key("Patient", &[]), vec![]);
        cache.insert(key("Condition", &[]), vec![]);
        cache.clear();
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_hit_rate() {
        let cache = SearchCache::default();
        let k = key("Patient", &[]);
        assert_eq!(cache.stats().hit_rate(), 0.0);
        cache.insert(k.clone(), vec![]);
        cache.get(&k);
        cache.get(&key("Observation", &[]));
        assert!((cache.stats().hit_rate() - 50.0).abs() < f64::EPSILON);
    }
}
