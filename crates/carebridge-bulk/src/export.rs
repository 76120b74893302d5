//! Export worker: one NDJSON file per requested resource type.

use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use carebridge_core::{ResourceType, format_rfc3339, ndjson, now_utc};
use carebridge_store::{ResilientClient, SearchParams};
use uuid::Uuid;

use crate::error::Result;
use crate::job::{ExportJob, ExportLevel, JobStatus, ManifestEntry};
use crate::registry::JobRegistry;

/// Job body executed on the export pool.
pub(crate) async fn run(registry: Arc<JobRegistry>, id: Uuid) {
    if let Err(e) = execute(&registry, id).await {
        tracing::error!(job_id = %id, error = %e, "export job failed");
        registry.with_export(id, |job| {
            if !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.error_message = Some(e.to_string());
                job.completed_at = Some(now_utc());
            }
        });
    }
}

async fn execute(registry: &Arc<JobRegistry>, id: Uuid) -> Result<()> {
    // Snapshot the plan; all later mutation happens in short lock sections.
    // Only a Pending job may start: a job deleted or cancelled while still
    // queued is left untouched.
    let Some(snapshot) = registry
        .with_export(id, |job| {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::InProgress;
                Some(job.clone())
            } else {
                None
            }
        })
        .flatten()
    else {
        return Ok(());
    };

    tracing::info!(
        job_id = %id,
        level = %snapshot.level,
        resource_types = snapshot.resource_types.len(),
        "export job started"
    );

    std::fs::create_dir_all(&snapshot.output_dir)?;

    let client = Arc::clone(registry.client());
    let total = snapshot.resource_types.len();
    for (index, resource_type) in snapshot.resource_types.iter().enumerate() {
        // Cooperative cancellation, checked once per type boundary.
        let proceed = registry.with_export(id, |job| {
            if job.status == JobStatus::Cancelled {
                false
            } else {
                job.set_progress((index * 100 / total) as u8);
                true
            }
        });
        match proceed {
            Some(true) => {}
            Some(false) => {
                tracing::info!(job_id = %id, "export job stopped at cancellation check");
                return Ok(());
            }
            // Deleted mid-flight; nothing left to update.
            None => return Ok(()),
        }

        let params = build_scope_params(&snapshot, resource_type, registry.page_size());

        // A per-type fetch or write failure degrades that type to empty
        // and never aborts the job.
        match export_one(&client, resource_type, &params, &snapshot.output_dir).await {
            Ok(Some((path, count))) => {
                registry.with_export(id, |job| {
                    job.manifest.push(ManifestEntry {
                        resource_type: resource_type.clone(),
                        path,
                        record_count: count,
                    });
                    job.total_record_count += count as u64;
                });
                tracing::debug!(job_id = %id, resource_type = %resource_type, records = count, "type exported");
            }
            Ok(None) => {
                tracing::debug!(job_id = %id, resource_type = %resource_type, "no records, skipping file");
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %id,
                    resource_type = %resource_type,
                    error = %e,
                    "resource type export failed, continuing"
                );
            }
        }
    }

    let completed = registry.with_export(id, |job| {
        if job.status == JobStatus::Cancelled {
            false
        } else {
            job.status = JobStatus::Completed;
            job.set_progress(100);
            job.completed_at = Some(now_utc());
            true
        }
    });
    if completed == Some(true) {
        let totals = registry.with_export(id, |job| (job.manifest.len(), job.total_record_count));
        if let Some((files, records)) = totals {
            tracing::info!(job_id = %id, files, records, "export job completed");
        }
    }
    Ok(())
}

/// Fetch one resource type and write its NDJSON file.
///
/// Returns `None` when the search produced no records (no file is written).
async fn export_one(
    client: &ResilientClient,
    resource_type: &ResourceType,
    params: &SearchParams,
    output_dir: &Path,
) -> Result<Option<(PathBuf, usize)>> {
    let records = client.search(resource_type, params).await?;
    if records.is_empty() {
        return Ok(None);
    }

    let path = output_dir.join(format!("{resource_type}.{}", ndjson::FILE_EXTENSION));
    let file = std::fs::File::create(&path)?;
    let mut writer = BufWriter::new(file);
    ndjson::write_records(&records, &mut writer)?;

    Ok(Some((path, records.len())))
}

/// Search parameters scoping one resource type of an export job.
fn build_scope_params(job: &ExportJob, resource_type: &ResourceType, page_size: usize) -> SearchParams {
    let mut params = SearchParams::new();
    params.insert("_count".to_string(), page_size.to_string());

    if let Some(since) = job.since {
        if let Ok(stamp) = format_rfc3339(since) {
            params.insert("_lastUpdated".to_string(), format!("ge{stamp}"));
        }
    }

    match job.level {
        ExportLevel::Patient => {
            let ids = job.patient_ids.join(",");
            if *resource_type == ResourceType::Patient {
                params.insert("_id".to_string(), ids);
            } else {
                params.insert("patient".to_string(), ids);
            }
        }
        ExportLevel::Group => {
            if let Some(group_id) = &job.group_id {
                params.insert("group".to_string(), group_id.clone());
            }
        }
        ExportLevel::System => {}
    }

    // Type filter entries look like "Observation?status=final&code=1234".
    for entry in &job.type_filter {
        if let Some((name, query)) = entry.split_once('?') {
            if name != resource_type.to_string() {
                continue;
            }
            for pair in query.split('&') {
                if let Some((key, value)) = pair.split_once('=') {
                    params.insert(key.to_string(), value.to_string());
                }
            }
        }
    }

    params
}
