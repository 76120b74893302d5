//! Thread-safe registry of bulk jobs.
//!
//! One registry is constructed per process and passed by reference to
//! every call site; it owns the job maps, the worker pools and the
//! resilient client handed to workers. Each job map is guarded by its
//! own mutex, and no lock is ever held across network or file I/O:
//! workers mutate job state through short [`JobRegistry::with_export`] /
//! [`JobRegistry::with_import`] critical sections.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use carebridge_core::{ResourceType, now_utc};
use carebridge_store::ResilientClient;
use uuid::Uuid;

use crate::config::BulkConfig;
use crate::error::{BulkError, Result};
use crate::job::{
    ExportJob, ExportLevel, ExportRequest, ImportJob, ImportRequest, JobStatus,
};
use crate::pool::WorkerPool;
use crate::{export, import};

/// Registry and scheduler for bulk export/import jobs.
pub struct JobRegistry {
    config: BulkConfig,
    client: Arc<ResilientClient>,
    exports: Mutex<HashMap<Uuid, ExportJob>>,
    imports: Mutex<HashMap<Uuid, ImportJob>>,
    export_pool: WorkerPool,
    import_pool: WorkerPool,
}

impl JobRegistry {
    /// Build the registry and spin up its worker pools.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(client: Arc<ResilientClient>, config: BulkConfig) -> Arc<Self> {
        let export_pool = WorkerPool::new("bulk-export", config.export_workers);
        let import_pool = WorkerPool::new("bulk-import", config.import_workers);
        Arc::new(Self {
            config,
            client,
            exports: Mutex::new(HashMap::new()),
            imports: Mutex::new(HashMap::new()),
            export_pool,
            import_pool,
        })
    }

    /// Validate an export request, register the job as `Pending` and
    /// enqueue its body on the export pool. Returns a snapshot of the
    /// freshly created job without blocking on execution.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedResourceType` or `InvalidRequest` before any
    /// job is registered; a rejected request leaves the registry unchanged.
    pub fn create_export(self: &Arc<Self>, request: ExportRequest) -> Result<ExportJob> {
        let resource_types = validate_resource_types(&request.resource_types)?;

        let patient_ids = request.patient_ids.unwrap_or_default();
        match request.level {
            ExportLevel::Patient if patient_ids.is_empty() => {
                return Err(BulkError::invalid_request(
                    "patient-level export requires patientIds",
                ));
            }
            ExportLevel::Group if request.group_id.is_none() => {
                return Err(BulkError::invalid_request(
                    "group-level export requires groupId",
                ));
            }
            _ => {}
        }

        let type_filter = request.type_filter.unwrap_or_default();
        for entry in &type_filter {
            if !entry.contains('?') {
                return Err(BulkError::invalid_request(format!(
                    "type filter entry '{entry}' must have the form ResourceType?param=value"
                )));
            }
        }

        let id = Uuid::new_v4();
        let job = ExportJob {
            id,
            status: JobStatus::Pending,
            level: request.level,
            resource_types,
            patient_ids,
            group_id: request.group_id,
            since: request.since,
            type_filter,
            manifest: Vec::new(),
            error_message: None,
            progress_percent: 0,
            total_record_count: 0,
            created_at: now_utc(),
            completed_at: None,
            output_dir: self.config.jobs_dir.join(id.to_string()),
        };

        self.exports.lock().unwrap().insert(id, job.clone());

        let registry = Arc::clone(self);
        self.export_pool
            .submit(Box::pin(async move { export::run(registry, id).await }));

        tracing::info!(
            job_id = %id,
            level = %job.level,
            resource_types = job.resource_types.len(),
            "export job created"
        );
        Ok(job)
    }

    /// Validate an import request, register the job as `Pending` and
    /// enqueue its body on the import pool.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedResourceType` or `InvalidRequest` before any
    /// job is registered.
    pub fn create_import(self: &Arc<Self>, request: ImportRequest) -> Result<ImportJob> {
        if request.sources.is_empty() {
            return Err(BulkError::invalid_request(
                "import requires at least one source",
            ));
        }
        for source in &request.sources {
            if !source.resource_type.is_supported() {
                return Err(BulkError::UnsupportedResourceType(
                    source.resource_type.to_string(),
                ));
            }
            if source.content.is_none() && source.file_path.is_none() {
                return Err(BulkError::invalid_request(
                    "import source needs either content or filePath",
                ));
            }
        }

        let id = Uuid::new_v4();
        let job = ImportJob {
            id,
            status: JobStatus::Pending,
            inputs: request.sources,
            imported_counts: Default::default(),
            errors: Vec::new(),
            error_message: None,
            progress_percent: 0,
            total_imported: 0,
            created_at: now_utc(),
            completed_at: None,
        };

        self.imports.lock().unwrap().insert(id, job.clone());

        let registry = Arc::clone(self);
        self.import_pool
            .submit(Box::pin(async move { import::run(registry, id).await }));

        tracing::info!(job_id = %id, sources = job.inputs.len(), "import job created");
        Ok(job)
    }

    /// Snapshot of an export job.
    pub fn get_export(&self, id: Uuid) -> Option<ExportJob> {
        self.exports.lock().unwrap().get(&id).cloned()
    }

    /// Snapshot of an import job.
    pub fn get_import(&self, id: Uuid) -> Option<ImportJob> {
        self.imports.lock().unwrap().get(&id).cloned()
    }

    /// All export jobs, optionally filtered by status, oldest first.
    pub fn list_exports(&self, status: Option<JobStatus>) -> Vec<ExportJob> {
        let mut jobs: Vec<ExportJob> = self
            .exports
            .lock()
            .unwrap()
            .values()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// All import jobs, optionally filtered by status, oldest first.
    pub fn list_imports(&self, status: Option<JobStatus>) -> Vec<ImportJob> {
        let mut jobs: Vec<ImportJob> = self
            .imports
            .lock()
            .unwrap()
            .values()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Request cooperative cancellation.
    ///
    /// Returns `true` only if the job existed and was still `Pending` or
    /// `InProgress`; a job already in a terminal state is left untouched.
    /// The worker notices the flag at its next type/source boundary.
    pub fn cancel(&self, id: Uuid) -> bool {
        {
            let mut exports = self.exports.lock().unwrap();
            if let Some(job) = exports.get_mut(&id) {
                if job.status.is_terminal() {
                    return false;
                }
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now_utc());
                tracing::info!(job_id = %id, "export job cancelled");
                return true;
            }
        }
        let mut imports = self.imports.lock().unwrap();
        if let Some(job) = imports.get_mut(&id) {
            if job.status.is_terminal() {
                return false;
            }
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(now_utc());
            tracing::info!(job_id = %id, "import job cancelled");
            return true;
        }
        false
    }

    /// Remove a job record and any files it owns.
    ///
    /// Known limitation: deleting a running job does not stop it; callers
    /// should cancel first. The orphaned worker's state updates become
    /// no-ops once the record is gone.
    pub fn delete(&self, id: Uuid) -> bool {
        let removed = self.exports.lock().unwrap().remove(&id);
        if let Some(job) = removed {
            if job.output_dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(&job.output_dir) {
                    tracing::warn!(
                        job_id = %id,
                        dir = %job.output_dir.display(),
                        error = %e,
                        "failed to remove export job directory"
                    );
                }
            }
            tracing::info!(job_id = %id, "export job deleted");
            return true;
        }
        if self.imports.lock().unwrap().remove(&id).is_some() {
            tracing::info!(job_id = %id, "import job deleted");
            return true;
        }
        false
    }

    /// Path of a completed export artifact, if the job's manifest has an
    /// entry for that resource type.
    pub fn export_file(&self, id: Uuid, resource_type: &str) -> Option<PathBuf> {
        let exports = self.exports.lock().unwrap();
        let job = exports.get(&id)?;
        job.manifest
            .iter()
            .find(|entry| entry.resource_type.to_string() == resource_type)
            .map(|entry| entry.path.clone())
    }

    /// Total number of registered jobs of both kinds.
    pub fn len(&self) -> usize {
        self.exports.lock().unwrap().len() + self.imports.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn client(&self) -> &Arc<ResilientClient> {
        &self.client
    }

    pub(crate) fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Run `f` against an export job under the map lock. Returns `None`
    /// if the job has been deleted.
    pub(crate) fn with_export<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ExportJob) -> R,
    ) -> Option<R> {
        self.exports.lock().unwrap().get_mut(&id).map(f)
    }

    /// Run `f` against an import job under the map lock. Returns `None`
    /// if the job has been deleted.
    pub(crate) fn with_import<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ImportJob) -> R,
    ) -> Option<R> {
        self.imports.lock().unwrap().get_mut(&id).map(f)
    }
}

/// Parse and validate requested resource types, deduplicating while
/// preserving the requested order.
fn validate_resource_types(names: &[String]) -> Result<Vec<ResourceType>> {
    if names.is_empty() {
        return Err(BulkError::invalid_request(
            "export requires at least one resource type",
        ));
    }
    let mut types = Vec::with_capacity(names.len());
    for name in names {
        let rt = ResourceType::parse_supported(name)
            .map_err(|_| BulkError::UnsupportedResourceType(name.clone()))?;
        if !types.contains(&rt) {
            types.push(rt);
        }
    }
    Ok(types)
}
