//! End-to-end tests for the bulk job pipeline against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carebridge_bulk::{
    BulkConfig, ExportLevel, ExportRequest, ImportRequest, ImportSource, JobRegistry, JobStatus,
};
use carebridge_core::{ResourceType, ndjson};
use carebridge_store::{
    ClientConfig, MemoryStore, ResilientClient, ResourceStore, SearchParams, StoreError,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use uuid::Uuid;

struct Harness {
    registry: Arc<JobRegistry>,
    store: Arc<MemoryStore>,
    _jobs_dir: TempDir,
}

fn harness_with_store(store: Arc<dyn ResourceStore>) -> (Arc<JobRegistry>, TempDir) {
    let jobs_dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ResilientClient::new(store, ClientConfig::default()));
    let config = BulkConfig {
        jobs_dir: jobs_dir.path().to_path_buf(),
        ..BulkConfig::default()
    };
    (JobRegistry::new(client, config), jobs_dir)
}

fn single_worker_harness(store: Arc<dyn ResourceStore>) -> (Arc<JobRegistry>, TempDir) {
    let jobs_dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ResilientClient::new(store, ClientConfig::default()));
    let config = BulkConfig {
        jobs_dir: jobs_dir.path().to_path_buf(),
        export_workers: 1,
        import_workers: 1,
        ..BulkConfig::default()
    };
    (JobRegistry::new(client, config), jobs_dir)
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let (registry, jobs_dir) = harness_with_store(store.clone());
    Harness {
        registry,
        store,
        _jobs_dir: jobs_dir,
    }
}

fn seed_clinical_data(store: &MemoryStore) {
    store.seed(
        &"Patient".parse().unwrap(),
        vec![json!({"id": "42", "resourceType": "Patient"})],
    );
    store.seed(
        &"Observation".parse().unwrap(),
        vec![
            json!({"id": "o1", "resourceType": "Observation", "subject": {"reference": "Patient/42"}}),
            json!({"id": "o2", "resourceType": "Observation", "subject": {"reference": "Patient/42"}}),
            json!({"id": "o3", "resourceType": "Observation", "subject": {"reference": "Patient/99"}}),
        ],
    );
}

async fn wait_for_export_terminal(registry: &JobRegistry, id: Uuid) -> carebridge_bulk::ExportJob {
    for _ in 0..200 {
        if let Some(job) = registry.get_export(id) {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("export job {id} did not reach a terminal state");
}

async fn wait_for_import_terminal(registry: &JobRegistry, id: Uuid) -> carebridge_bulk::ImportJob {
    for _ in 0..200 {
        if let Some(job) = registry.get_import(id) {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("import job {id} did not reach a terminal state");
}

fn patient_export(types: &[&str]) -> ExportRequest {
    ExportRequest {
        level: ExportLevel::Patient,
        resource_types: types.iter().map(|s| s.to_string()).collect(),
        patient_ids: Some(vec!["42".to_string()]),
        group_id: None,
        since: None,
        type_filter: None,
    }
}

#[tokio::test]
async fn test_patient_export_completes_with_manifest() {
    let h = harness();
    seed_clinical_data(&h.store);

    let job = h
        .registry
        .create_export(patient_export(&["Patient", "Observation"]))
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let job = wait_for_export_terminal(&h.registry, job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress_percent, 100);
    assert!(job.completed_at.is_some());

    // At most one manifest entry per requested type, counts consistent.
    assert!(job.manifest.len() <= 2);
    let manifest_total: u64 = job.manifest.iter().map(|e| e.record_count as u64).sum();
    assert_eq!(manifest_total, job.total_record_count);

    // Patient/42 plus its two observations.
    assert_eq!(job.total_record_count, 3);

    // One NDJSON file per non-empty type, under the job's own directory.
    for entry in &job.manifest {
        assert!(entry.path.starts_with(&job.output_dir));
        let content = std::fs::read_to_string(&entry.path).unwrap();
        assert_eq!(ndjson::lines(&content).count(), entry.record_count);
    }
}

#[tokio::test]
async fn test_export_skips_empty_types_without_files() {
    let h = harness();
    seed_clinical_data(&h.store);

    let job = h
        .registry
        .create_export(patient_export(&["Patient", "Condition"]))
        .unwrap();
    let job = wait_for_export_terminal(&h.registry, job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.manifest.len(), 1);
    assert!(!job.output_dir.join("Condition.ndjson").exists());
}

/// Store that fails every Observation search but serves everything else.
struct PartiallyBrokenStore {
    inner: MemoryStore,
}

#[async_trait]
impl ResourceStore for PartiallyBrokenStore {
    async fn search(
        &self,
        resource_type: &ResourceType,
        params: &SearchParams,
    ) -> Result<Vec<Value>, StoreError> {
        if resource_type.to_string() == "Observation" {
            return Err(StoreError::unavailable("observation shard down"));
        }
        self.inner.search(resource_type, params).await
    }

    async fn create(&self, rt: &ResourceType, body: &Value) -> Result<Value, StoreError> {
        self.inner.create(rt, body).await
    }

    async fn update(&self, rt: &ResourceType, id: &str, body: &Value) -> Result<Value, StoreError> {
        self.inner.update(rt, id, body).await
    }
}

#[tokio::test]
async fn test_failing_type_is_isolated_and_job_completes() {
    let inner = MemoryStore::new();
    seed_clinical_data(&inner);
    let (registry, _dir) = harness_with_store(Arc::new(PartiallyBrokenStore { inner }));

    let job = registry
        .create_export(patient_export(&["Patient", "Observation"]))
        .unwrap();
    let job = wait_for_export_terminal(&registry, job.id).await;

    // The broken type contributes nothing, the job still completes.
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.manifest.len(), 1);
    assert_eq!(job.manifest[0].resource_type.to_string(), "Patient");
}

/// Store whose calls block long enough to observe a running job.
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl ResourceStore for SlowStore {
    async fn search(
        &self,
        resource_type: &ResourceType,
        params: &SearchParams,
    ) -> Result<Vec<Value>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.search(resource_type, params).await
    }

    async fn create(&self, rt: &ResourceType, body: &Value) -> Result<Value, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.create(rt, body).await
    }

    async fn update(&self, rt: &ResourceType, id: &str, body: &Value) -> Result<Value, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.update(rt, id, body).await
    }
}

#[tokio::test]
async fn test_cancel_running_export_sticks() {
    let inner = MemoryStore::new();
    seed_clinical_data(&inner);
    let store = Arc::new(SlowStore {
        inner,
        delay: Duration::from_millis(100),
    });
    let (registry, _dir) = harness_with_store(store);

    let job = registry
        .create_export(patient_export(&[
            "Patient",
            "Observation",
            "Condition",
            "Encounter",
        ]))
        .unwrap();

    // Let the worker start, then cancel mid-flight.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(registry.cancel(job.id));

    let job = wait_for_export_terminal(&registry, job.id).await;
    assert_eq!(job.status, JobStatus::Cancelled);

    // The terminal state never flips, even after the worker unwinds.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let job = registry.get_export(job.id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.progress_percent < 100);
}

#[tokio::test]
async fn test_cancel_queued_export_never_starts() {
    let inner = MemoryStore::new();
    seed_clinical_data(&inner);
    let store = Arc::new(SlowStore {
        inner,
        delay: Duration::from_millis(100),
    });
    let (registry, _dir) = single_worker_harness(store);

    // The only worker is busy with the first job while the second waits.
    let busy = registry
        .create_export(patient_export(&["Patient", "Observation"]))
        .unwrap();
    let queued = registry.create_export(patient_export(&["Patient"])).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(
        registry.get_export(queued.id).unwrap().status,
        JobStatus::Pending
    );
    assert!(registry.cancel(queued.id));

    wait_for_export_terminal(&registry, busy.id).await;
    // Give the worker time to dequeue the cancelled job.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let job = registry.get_export(queued.id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.progress_percent, 0);
    assert!(job.manifest.is_empty());
    assert!(!job.output_dir.exists());
}

#[tokio::test]
async fn test_cancel_queued_import_never_starts() {
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        delay: Duration::from_millis(100),
    });
    let (registry, _dir) = single_worker_harness(store);

    let source = |name: &str| ImportSource {
        resource_type: "Patient".parse().unwrap(),
        content: Some(format!(
            "{{\"resourceType\": \"Patient\", \"name\": \"{name}\"}}\n"
        )),
        file_path: None,
    };

    let busy = registry
        .create_import(ImportRequest {
            sources: vec![source("a"), source("b")],
        })
        .unwrap();
    let queued = registry
        .create_import(ImportRequest {
            sources: vec![source("c")],
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(
        registry.get_import(queued.id).unwrap().status,
        JobStatus::Pending
    );
    assert!(registry.cancel(queued.id));

    wait_for_import_terminal(&registry, busy.id).await;
    // Give the worker time to dequeue the cancelled job.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let job = registry.get_import(queued.id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.total_imported, 0);
    assert!(job.imported_counts.is_empty());
}

#[tokio::test]
async fn test_cancel_terminal_job_returns_false_and_preserves_state() {
    let h = harness();
    seed_clinical_data(&h.store);

    let job = h.registry.create_export(patient_export(&["Patient"])).unwrap();
    let job = wait_for_export_terminal(&h.registry, job.id).await;
    assert_eq!(job.status, JobStatus::Completed);

    assert!(!h.registry.cancel(job.id));
    let after = h.registry.get_export(job.id).unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.completed_at, job.completed_at);
}

#[tokio::test]
async fn test_delete_removes_record_and_files() {
    let h = harness();
    seed_clinical_data(&h.store);

    let job = h.registry.create_export(patient_export(&["Patient"])).unwrap();
    let job = wait_for_export_terminal(&h.registry, job.id).await;
    assert!(job.output_dir.exists());

    assert!(h.registry.delete(job.id));
    assert!(h.registry.get_export(job.id).is_none());
    assert!(!job.output_dir.exists());
}

#[tokio::test]
async fn test_import_counts_malformed_lines_and_completes() {
    let h = harness();

    // Five lines, two malformed.
    let content = [
        r#"{"resourceType": "Patient", "name": "a"}"#,
        "this is not json",
        r#"{"resourceType": "Patient", "name": "b"}"#,
        r#"{"broken": "#,
        r#"{"resourceType": "Patient", "name": "c"}"#,
    ]
    .join("\n");

    let job = h
        .registry
        .create_import(ImportRequest {
            sources: vec![ImportSource {
                resource_type: "Patient".parse().unwrap(),
                content: Some(content),
                file_path: None,
            }],
        })
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let job = wait_for_import_terminal(&h.registry, job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress_percent, 100);
    assert_eq!(job.errors.len(), 2);
    assert_eq!(job.imported_counts.get("Patient"), Some(&3));
    assert_eq!(job.total_imported, 3);
    for issue in &job.errors {
        assert_eq!(issue.resource_type.to_string(), "Patient");
        assert!(issue.line_excerpt.chars().count() <= 100);
    }
    assert_eq!(h.store.count(&"Patient".parse().unwrap()), 3);
}

#[tokio::test]
async fn test_reimport_with_existing_ids_is_idempotent() {
    let h = harness();
    h.store.seed(
        &"Patient".parse().unwrap(),
        vec![json!({"id": "p1"}), json!({"id": "p2"})],
    );

    let content = concat!(
        "{\"resourceType\": \"Patient\", \"id\": \"p1\", \"active\": true}\n",
        "{\"resourceType\": \"Patient\", \"id\": \"p2\", \"active\": true}\n",
    );
    let request = ImportRequest {
        sources: vec![ImportSource {
            resource_type: "Patient".parse().unwrap(),
            content: Some(content.to_string()),
            file_path: None,
        }],
    };

    let first = h.registry.create_import(request.clone()).unwrap();
    let first = wait_for_import_terminal(&h.registry, first.id).await;
    let second = h.registry.create_import(request).unwrap();
    let second = wait_for_import_terminal(&h.registry, second.id).await;

    assert_eq!(first.imported_counts, second.imported_counts);
    assert_eq!(first.imported_counts.get("Patient"), Some(&2));
    // Updates only: the store never grows.
    assert_eq!(h.store.count(&"Patient".parse().unwrap()), 2);
}

#[tokio::test]
async fn test_import_from_file_path() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Patient.ndjson");
    std::fs::write(&path, "{\"resourceType\": \"Patient\"}\n\n{\"resourceType\": \"Patient\"}\n")
        .unwrap();

    let job = h
        .registry
        .create_import(ImportRequest {
            sources: vec![ImportSource {
                resource_type: "Patient".parse().unwrap(),
                content: None,
                file_path: Some(path),
            }],
        })
        .unwrap();
    let job = wait_for_import_terminal(&h.registry, job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.imported_counts.get("Patient"), Some(&2));
}

#[tokio::test]
async fn test_import_with_unreadable_file_fails_job() {
    let h = harness();
    let job = h
        .registry
        .create_import(ImportRequest {
            sources: vec![ImportSource {
                resource_type: "Patient".parse().unwrap(),
                content: None,
                file_path: Some("/nonexistent/input.ndjson".into()),
            }],
        })
        .unwrap();
    let job = wait_for_import_terminal(&h.registry, job.id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.is_some());
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let h = harness();
    seed_clinical_data(&h.store);

    let a = h.registry.create_export(patient_export(&["Patient"])).unwrap();
    let b = h.registry.create_export(patient_export(&["Observation"])).unwrap();
    wait_for_export_terminal(&h.registry, a.id).await;
    wait_for_export_terminal(&h.registry, b.id).await;

    assert_eq!(h.registry.list_exports(None).len(), 2);
    assert_eq!(
        h.registry.list_exports(Some(JobStatus::Completed)).len(),
        2
    );
    assert!(h.registry.list_exports(Some(JobStatus::Failed)).is_empty());
}
