//! In-memory reference implementation of [`ResourceStore`].
//!
//! Used by integration tests and by the server when no remote backend is
//! configured. Supports the subset of search semantics the bulk pipeline
//! relies on: exact top-level matches, `_id`/`patient`/`subject`/`group`
//! scoping, `_lastUpdated=ge...` since-filters and a `_count` page cap.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use carebridge_core::{ResourceType, format_rfc3339, now_utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::traits::{ResourceStore, SearchParams};

/// Thread-safe in-memory record store, one vec per resource type.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with records of one type, assigning ids and
    /// `meta.lastUpdated` stamps where missing.
    pub fn seed(&self, resource_type: &ResourceType, records: Vec<Value>) {
        let mut guard = self.records.lock().unwrap();
        let entries = guard.entry(resource_type.to_string()).or_default();
        for mut record in records {
            prepare_record(&mut record);
            entries.push(record);
        }
    }

    /// Number of stored records of one type.
    pub fn count(&self, resource_type: &ResourceType) -> usize {
        self.records
            .lock()
            .unwrap()
            .get(&resource_type.to_string())
            .map_or(0, Vec::len)
    }
}

/// Assign an id and a `meta.lastUpdated` stamp where missing.
fn prepare_record(record: &mut Value) {
    if let Some(obj) = record.as_object_mut() {
        if !obj.contains_key("id") {
            obj.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        let stamp = format_rfc3339(now_utc()).unwrap_or_default();
        let meta = obj
            .entry("meta")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Some(meta) = meta.as_object_mut() {
            meta.insert("lastUpdated".to_string(), Value::String(stamp));
        }
    }
}

/// Whether `field` references one of the comma-separated `values`,
/// either as a plain string or via a `reference` sub-field
/// (`"Patient/42"` matches the value `42`).
fn reference_matches(field: Option<&Value>, values: &str) -> bool {
    let Some(field) = field else {
        return false;
    };
    let reference = field
        .get("reference")
        .and_then(Value::as_str)
        .or_else(|| field.as_str());
    let Some(reference) = reference else {
        return false;
    };
    values
        .split(',')
        .any(|v| reference == v || reference.ends_with(&format!("/{v}")))
}

fn matches_param(record: &Value, name: &str, value: &str) -> bool {
    match name {
        "_id" => record
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| value.split(',').any(|v| v == id)),
        "patient" | "subject" => {
            reference_matches(record.get("subject").or_else(|| record.get("patient")), value)
        }
        "group" => reference_matches(record.get("group"), value),
        "_lastUpdated" => {
            // Only `ge` is used by the bulk pipeline's since-filter.
            let Some(threshold) = value.strip_prefix("ge") else {
                return true;
            };
            record
                .get("meta")
                .and_then(|m| m.get("lastUpdated"))
                .and_then(Value::as_str)
                .is_some_and(|stamp| stamp >= threshold)
        }
        _ => record
            .get(name)
            .and_then(Value::as_str)
            .is_some_and(|v| v == value),
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn search(
        &self,
        resource_type: &ResourceType,
        params: &SearchParams,
    ) -> Result<Vec<Value>> {
        let limit = params
            .get("_count")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(usize::MAX);

        let guard = self.records.lock().unwrap();
        let Some(entries) = guard.get(&resource_type.to_string()) else {
            return Ok(Vec::new());
        };

        let results = entries
            .iter()
            .filter(|record| {
                params
                    .iter()
                    .filter(|(name, _)| name.as_str() != "_count")
                    .all(|(name, value)| matches_param(record, name, value))
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(results)
    }

    async fn create(&self, resource_type: &ResourceType, body: &Value) -> Result<Value> {
        if !body.is_object() {
            return Err(StoreError::invalid_record("record body must be a JSON object"));
        }
        let mut record = body.clone();
        prepare_record(&mut record);

        let mut guard = self.records.lock().unwrap();
        guard
            .entry(resource_type.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        resource_type: &ResourceType,
        id: &str,
        body: &Value,
    ) -> Result<Value> {
        if !body.is_object() {
            return Err(StoreError::invalid_record("record body must be a JSON object"));
        }
        let mut record = body.clone();
        if let Some(obj) = record.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.to_string()));
        }
        prepare_record(&mut record);

        // Upsert: replace in place, insert if absent.
        let mut guard = self.records.lock().unwrap();
        let entries = guard.entry(resource_type.to_string()).or_default();
        match entries
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
        {
            Some(existing) => *existing = record.clone(),
            None => entries.push(record.clone()),
        }
        Ok(record)
    }
}
