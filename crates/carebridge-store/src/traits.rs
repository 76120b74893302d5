//! The contract every resource store backend must implement.

use std::collections::BTreeMap;

use async_trait::async_trait;
use carebridge_core::ResourceType;
use serde_json::Value;

use crate::error::StoreError;

/// Search parameters, canonically ordered by key.
///
/// A `BTreeMap` keeps parameters sorted, so two logically identical
/// queries always canonicalize to the same cache key.
pub type SearchParams = BTreeMap<String, String>;

/// The remote clinical-data backend, reduced to the three operations
/// the gateway core needs. Implementations must be thread-safe.
///
/// # Example
///
/// ```ignore
/// use carebridge_store::{ResourceStore, SearchParams};
///
/// async fn patient_count(store: &dyn ResourceStore) -> usize {
///     let records = store
///         .search(&"Patient".parse().unwrap(), &SearchParams::new())
///         .await
///         .unwrap_or_default();
///     records.len()
/// }
/// ```
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Searches for records of a given type.
    ///
    /// Business-level absence is an empty result, never an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` for transport failures and
    /// 5xx responses.
    async fn search(
        &self,
        resource_type: &ResourceType,
        params: &SearchParams,
    ) -> Result<Vec<Value>, StoreError>;

    /// Creates a new record and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidRecord` if the body is malformed,
    /// `StoreError::Unavailable` for transport failures.
    async fn create(
        &self,
        resource_type: &ResourceType,
        body: &Value,
    ) -> Result<Value, StoreError>;

    /// Updates the record with the given id and returns the stored version.
    ///
    /// Backends may treat an update of an unknown id as an upsert, matching
    /// the PUT semantics of the clinical-data protocol.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidRecord` if the body is malformed,
    /// `StoreError::Unavailable` for transport failures.
    async fn update(
        &self,
        resource_type: &ResourceType,
        id: &str,
        body: &Value,
    ) -> Result<Value, StoreError>;
}
