//! Import worker: NDJSON lines in, store writes out.

use std::sync::Arc;

use carebridge_core::{ResourceType, ndjson, now_utc};
use carebridge_store::{ResilientClient, StoreError};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{BulkError, Result};
use crate::job::{ImportIssue, ImportSource, JobStatus};
use crate::registry::JobRegistry;

/// Longest excerpt of an offending line kept in the error list.
const EXCERPT_CHARS: usize = 100;

/// Job body executed on the import pool.
pub(crate) async fn run(registry: Arc<JobRegistry>, id: Uuid) {
    if let Err(e) = execute(&registry, id).await {
        tracing::error!(job_id = %id, error = %e, "import job failed");
        registry.with_import(id, |job| {
            if !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.error_message = Some(e.to_string());
                job.completed_at = Some(now_utc());
            }
        });
    }
}

async fn execute(registry: &Arc<JobRegistry>, id: Uuid) -> Result<()> {
    // Only a Pending job may start: a job deleted or cancelled while still
    // queued is left untouched.
    let Some(inputs) = registry
        .with_import(id, |job| {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::InProgress;
                Some(job.inputs.clone())
            } else {
                None
            }
        })
        .flatten()
    else {
        return Ok(());
    };

    tracing::info!(job_id = %id, sources = inputs.len(), "import job started");

    let client = Arc::clone(registry.client());
    let total = inputs.len();
    for (index, source) in inputs.iter().enumerate() {
        // Cooperative cancellation, checked once per source boundary.
        let proceed = registry.with_import(id, |job| {
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
                tracing::info!(job_id = %id, "import job stopped at cancellation check");
                return Ok(());
            }
            None => return Ok(()),
        }

        // A source-level failure (unreadable file) fails the whole job;
        // per-line failures below never do.
        let content = load_source(source).await?;
        if content.trim().is_empty() {
            continue;
        }

        let mut imported = 0usize;
        for (line_number, line) in ndjson::lines(&content) {
            match import_line(&client, &source.resource_type, line).await {
                Ok(()) => {
                    imported += 1;
                    registry.with_import(id, |job| job.total_imported += 1);
                }
                Err(e) => {
                    tracing::debug!(
                        job_id = %id,
                        resource_type = %source.resource_type,
                        line = line_number,
                        error = %e,
                        "import line rejected"
                    );
                    registry.with_import(id, |job| {
                        job.errors.push(ImportIssue {
                            resource_type: source.resource_type.clone(),
                            message: e.to_string(),
                            line_excerpt: excerpt(line),
                        });
                    });
                }
            }
        }

        registry.with_import(id, |job| {
            job.imported_counts
                .insert(source.resource_type.to_string(), imported);
        });
    }

    let completed = registry.with_import(id, |job| {
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
        let totals = registry.with_import(id, |job| (job.total_imported, job.errors.len()));
        if let Some((imported, errors)) = totals {
            tracing::info!(job_id = %id, imported, errors, "import job completed");
        }
    }
    Ok(())
}

async fn load_source(source: &ImportSource) -> Result<String> {
    if let Some(content) = &source.content {
        return Ok(content.clone());
    }
    if let Some(path) = &source.file_path {
        return Ok(tokio::fs::read_to_string(path).await?);
    }
    // Registration guarantees one of the two is set.
    Err(BulkError::invalid_request(
        "import source has neither content nor filePath",
    ))
}

/// Parse one line and write it to the store: records carrying an id are
/// updated, the rest are created.
async fn import_line(
    client: &ResilientClient,
    resource_type: &ResourceType,
    line: &str,
) -> std::result::Result<(), StoreError> {
    let record: Value = serde_json::from_str(line)?;
    match record.get("id").and_then(Value::as_str).map(str::to_owned) {
        Some(id) => {
            client.update(resource_type, &id, &record).await?;
        }
        None => {
            client.create(resource_type, &record).await?;
        }
    }
    Ok(())
}

/// First `EXCERPT_CHARS` characters of a line, char-boundary safe.
fn excerpt(line: &str) -> String {
    line.chars().take(EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_truncates_long_lines() {
        let long = "x".repeat(500);
        assert_eq!(excerpt(&long).len(), EXCERPT_CHARS);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let line = "ä".repeat(150);
        let cut = excerpt(&line);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS);
    }
}
