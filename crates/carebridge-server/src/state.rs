use std::sync::Arc;

use carebridge_bulk::JobRegistry;
use carebridge_store::ResilientClient;

/// Shared handles passed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub client: Arc<ResilientClient>,
}
