//! Bulk export/import job endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use carebridge_bulk::{BulkError, ExportJob, ExportRequest, ImportJob, ImportRequest, JobStatus};
use carebridge_core::ndjson;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

/// Error envelope returned to API clients.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<BulkError> for ApiError {
    fn from(err: BulkError) -> Self {
        let status = match &err {
            BulkError::JobNotFound(_) => StatusCode::NOT_FOUND,
            BulkError::UnsupportedResourceType(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BulkError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<JobStatus>,
}

// ==================== Export ====================

pub async fn create_export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<(StatusCode, Json<ExportJob>), ApiError> {
    let job = state.registry.create_export(request)?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub async fn list_exports(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<ExportJob>> {
    Json(state.registry.list_exports(params.status))
}

pub async fn get_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExportJob>, ApiError> {
    state
        .registry
        .get_export(id)
        .map(Json)
        .ok_or_else(|| BulkError::JobNotFound(id).into())
}

pub async fn cancel_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.registry.get_export(id).is_none() {
        return Err(BulkError::JobNotFound(id).into());
    }
    let cancelled = state.registry.cancel(id);
    Ok(Json(json!({ "id": id, "cancelled": cancelled })))
}

pub async fn delete_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.registry.delete(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(BulkError::JobNotFound(id).into())
    }
}

/// Serve one NDJSON artifact of a completed export job.
///
/// The path segment may be given with or without the `.ndjson` suffix.
pub async fn get_export_file(
    State(state): State<AppState>,
    Path((id, file)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    if state.registry.get_export(id).is_none() {
        return Err(BulkError::JobNotFound(id).into());
    }
    let resource_type = file.strip_suffix(".ndjson").unwrap_or(&file);
    let path = state
        .registry
        .export_file(id, resource_type)
        .ok_or_else(|| ApiError::not_found(format!("no {resource_type} artifact for job {id}")))?;
    let bytes = tokio::fs::read(&path).await.map_err(BulkError::from)?;
    Ok(([(header::CONTENT_TYPE, ndjson::CONTENT_TYPE)], bytes).into_response())
}

// ==================== Import ====================

pub async fn create_import(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<(StatusCode, Json<ImportJob>), ApiError> {
    let job = state.registry.create_import(request)?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub async fn list_imports(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<ImportJob>> {
    Json(state.registry.list_imports(params.status))
}

pub async fn get_import(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ImportJob>, ApiError> {
    state
        .registry
        .get_import(id)
        .map(Json)
        .ok_or_else(|| BulkError::JobNotFound(id).into())
}

pub async fn cancel_import(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.registry.get_import(id).is_none() {
        return Err(BulkError::JobNotFound(id).into());
    }
    let cancelled = state.registry.cancel(id);
    Ok(Json(json!({ "id": id, "cancelled": cancelled })))
}

pub async fn delete_import(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.registry.delete(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(BulkError::JobNotFound(id).into())
    }
}

// ==================== Health ====================

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cache = state.client.cache_stats();
    Json(json!({
        "status": "ok",
        "circuitBreaker": state.client.breaker_state().to_string(),
        "cache": {
            "size": cache.size,
            "hits": cache.hits,
            "misses": cache.misses,
            "hitRate": cache.hit_rate(),
        },
        "jobs": state.registry.len(),
    }))
}
