//! API routes.
//!
//! - `bulk` - asynchronous NDJSON export/import jobs and their artifacts

pub mod bulk;
