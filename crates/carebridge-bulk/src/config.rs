use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the bulk job pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Directory holding one sub-directory of NDJSON files per export job.
    pub jobs_dir: PathBuf,
    /// Export worker pool size.
    pub export_workers: usize,
    /// Import worker pool size.
    pub import_workers: usize,
    /// Page size cap applied to every export search (`_count`).
    pub page_size: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from("bulk-jobs"),
            export_workers: 2,
            import_workers: 2,
            page_size: 1000,
        }
    }
}

impl BulkConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.export_workers == 0 {
            return Err("bulk.export_workers must be > 0".into());
        }
        if self.import_workers == 0 {
            return Err("bulk.import_workers must be > 0".into());
        }
        if self.page_size == 0 {
            return Err("bulk.page_size must be > 0".into());
        }
        Ok(())
    }
}
