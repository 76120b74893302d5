//! Asynchronous bulk data job pipeline.
//!
//! Long-lived, cancellable, partially fault-tolerant export and import
//! jobs that stream record sets to and from NDJSON files. Jobs are
//! created synchronously, executed on bounded worker pools, and tracked
//! in a mutex-guarded registry with a strict state machine:
//!
//! ```text
//! Pending -> InProgress -> {Completed, Failed, Cancelled}
//! ```
//!
//! Cancellation is cooperative and coarse-grained: workers poll the job
//! status once per resource type (export) or input source (import).

pub mod config;
pub mod error;
mod export;
mod import;
pub mod job;
pub mod pool;
pub mod registry;

pub use config::BulkConfig;
pub use error::BulkError;
pub use job::{
    ExportJob, ExportLevel, ExportRequest, ImportIssue, ImportJob, ImportRequest, ImportSource,
    JobStatus, ManifestEntry,
};
pub use pool::WorkerPool;
pub use registry::JobRegistry;
