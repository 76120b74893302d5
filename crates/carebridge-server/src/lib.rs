//! Thin REST surface over the CareBridge bulk data core.

pub mod config;
pub mod observability;
pub mod routes;
pub mod state;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

pub use config::{AppConfig, load_config};
pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::bulk::health))
        .route(
            "/bulk/export",
            post(routes::bulk::create_export).get(routes::bulk::list_exports),
        )
        .route(
            "/bulk/export/{id}",
            get(routes::bulk::get_export).delete(routes::bulk::delete_export),
        )
        .route("/bulk/export/{id}/cancel", post(routes::bulk::cancel_export))
        .route(
            "/bulk/export/{id}/files/{file}",
            get(routes::bulk::get_export_file),
        )
        .route(
            "/bulk/import",
            post(routes::bulk::create_import).get(routes::bulk::list_imports),
        )
        .route(
            "/bulk/import/{id}",
            get(routes::bulk::get_import).delete(routes::bulk::delete_import),
        )
        .route("/bulk/import/{id}/cancel", post(routes::bulk::cancel_import))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
