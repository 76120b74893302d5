//! Resilient access client: circuit breaker + TTL cache + per-call timeout.
//!
//! All outbound traffic to the resource store goes through this client.
//! The breaker is consulted before any network attempt, every call is
//! bounded by a timeout, and the central
//! [`StoreError::is_infrastructure_failure`] predicate decides what the
//! breaker gets to see. Business-level absence surfaces as an empty
//! search result and never trips the breaker.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use carebridge_core::ResourceType;
use serde_json::Value;

use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::cache::{CacheKey, CacheStats, DEFAULT_TTL, SearchCache};
use crate::error::{Result, StoreError};
use crate::traits::{ResourceStore, SearchParams};

/// Configuration for the resilient client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Circuit breaker thresholds.
    pub breaker: BreakerConfig,
    /// TTL for cached search results.
    pub cache_ttl: Duration,
    /// Deadline for a single store call.
    pub call_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            cache_ttl: DEFAULT_TTL,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Breaker- and cache-protected wrapper around a [`ResourceStore`].
pub struct ResilientClient {
    store: Arc<dyn ResourceStore>,
    breaker: CircuitBreaker,
    cache: SearchCache,
    call_timeout: Duration,
}

impl ResilientClient {
    pub fn new(store: Arc<dyn ResourceStore>, config: ClientConfig) -> Self {
        Self {
            store,
            breaker: CircuitBreaker::new(config.breaker),
            cache: SearchCache::new(config.cache_ttl),
            call_timeout: config.call_timeout,
        }
    }

    /// Search with caching: an unexpired cached result is returned without
    /// touching the store; otherwise a live fetch populates the cache.
    pub async fn search(
        &self,
        resource_type: &ResourceType,
        params: &SearchParams,
    ) -> Result<Arc<Vec<Value>>> {
        let key = CacheKey::new(resource_type, params);
        if let Some(records) = self.cache.get(&key) {
            tracing::debug!(
                resource_type = %resource_type,
                records = records.len(),
                "search served from cache"
            );
            return Ok(records);
        }

        let records = self.search_live(resource_type, params).await?;
        Ok(self.cache.insert(key, records))
    }

    /// Search bypassing the cache entirely.
    pub async fn search_uncached(
        &self,
        resource_type: &ResourceType,
        params: &SearchParams,
    ) -> Result<Vec<Value>> {
        self.search_live(resource_type, params).await
    }

    async fn search_live(
        &self,
        resource_type: &ResourceType,
        params: &SearchParams,
    ) -> Result<Vec<Value>> {
        match self
            .guarded("search", resource_type, self.store.search(resource_type, params))
            .await
        {
            // Business absence is an empty result, not an error.
            Err(StoreError::NotFound { .. }) => Ok(Vec::new()),
            outcome => outcome,
        }
    }

    /// Create a record. Never reads the cache; invalidates the type on success.
    pub async fn create(&self, resource_type: &ResourceType, body: &Value) -> Result<Value> {
        let record = self
            .guarded("create", resource_type, self.store.create(resource_type, body))
            .await?;
        self.cache.invalidate_type(resource_type);
        Ok(record)
    }

    /// Update a record. Never reads the cache; invalidates the type on success.
    pub async fn update(
        &self,
        resource_type: &ResourceType,
        id: &str,
        body: &Value,
    ) -> Result<Value> {
        let record = self
            .guarded("update", resource_type, self.store.update(resource_type, id, body))
            .await?;
        self.cache.invalidate_type(resource_type);
        Ok(record)
    }

    /// One breaker-gated, timeout-bounded store call.
    async fn guarded<T, F>(
        &self,
        operation: &'static str,
        resource_type: &ResourceType,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.breaker.check()?;

        let outcome = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.call_timeout)),
        };

        match &outcome {
            Ok(_) => {
                self.breaker.on_success();
                tracing::debug!(operation, resource_type = %resource_type, "store call succeeded");
            }
            Err(e) if e.is_infrastructure_failure() => {
                self.breaker.on_failure();
                tracing::warn!(
                    operation,
                    resource_type = %resource_type,
                    error = %e,
                    "store call failed"
                );
            }
            Err(e) => {
                // The backend answered; a business error still proves liveness.
                self.breaker.on_success();
                tracing::debug!(
                    operation,
                    resource_type = %resource_type,
                    error = %e,
                    "store returned business error"
                );
            }
        }

        outcome
    }

    /// Current breaker state, for health reporting.
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Cache statistics snapshot.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Manually invalidate cached searches, for one type or all of them.
    pub fn clear_cache(&self, resource_type: Option<&ResourceType>) {
        match resource_type {
            Some(rt) => {
                self.cache.invalidate_type(rt);
            }
            None => self.cache.clear(),
        }
    }
}
