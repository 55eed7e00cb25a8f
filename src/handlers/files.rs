//! Catalog reads, deletes and raw content downloads.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::errors::ApiError;
use crate::metadata::store::FileRecord;
use crate::metrics;
use crate::validation::is_safe_stored_name;
use crate::AppState;

/// Body of a successful delete.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub success: bool,
}

/// What happened to the stored content once its record was removed.
///
/// Only [`DeleteOutcome::Removed`] is clean; the other two are logged and
/// otherwise ignored since the record is already gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    ContentMissing,
    ContentRemovalFailed(String),
}

impl DeleteOutcome {
    fn label(&self) -> &'static str {
        match self {
            DeleteOutcome::Removed => "removed",
            DeleteOutcome::ContentMissing => "content_missing",
            DeleteOutcome::ContentRemovalFailed(_) => "content_removal_failed",
        }
    }
}

/// List every record, newest first.
#[utoipa::path(
    get,
    path = "/files",
    tag = "Files",
    responses(
        (status = 200, description = "All file records", body = Vec<FileRecord>)
    )
)]
pub async fn list_files(State(state): State<Arc<AppState>>) -> Json<Vec<FileRecord>> {
    Json(state.catalog.list().await)
}

/// Fetch one record by id.
#[utoipa::path(
    get,
    path = "/files/{id}",
    tag = "Files",
    params(
        ("id" = String, Path, description = "Record id"),
    ),
    responses(
        (status = 200, description = "File record", body = FileRecord),
        (status = 404, description = "Unknown id")
    )
)]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, ApiError> {
    state
        .catalog
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("file record {id}")))
}

/// Remove a record, then its stored content.
#[utoipa::path(
    delete,
    path = "/files/{id}",
    tag = "Files",
    params(
        ("id" = String, Path, description = "Record id"),
    ),
    responses(
        (status = 200, description = "Record removed", body = DeleteResponse),
        (status = 401, description = "Token required"),
        (status = 404, description = "Unknown id"),
        (status = 500, description = "Internal error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let outcome = remove_file(&state, &id).await?;
    info!(id = %id, outcome = outcome.label(), "File deleted");
    Ok(Json(DeleteResponse { success: true }))
}

/// Delete `id` from the catalog and then from storage.
///
/// The catalog write happens first; content removal can only degrade the
/// returned [`DeleteOutcome`].
pub async fn remove_file(state: &AppState, id: &str) -> Result<DeleteOutcome, ApiError> {
    let record = match state.catalog.remove(id).await? {
        Some(r) => r,
        None => {
            metrics::record_delete("not_found");
            return Err(ApiError::not_found(format!("file record {id}")));
        }
    };

    let outcome = match state.storage.delete(&record.stored_name).await {
        Ok(true) => DeleteOutcome::Removed,
        Ok(false) => {
            warn!("Stored file {} was already gone", record.stored_name);
            DeleteOutcome::ContentMissing
        }
        Err(e) => {
            warn!("Failed to delete stored file {}: {:#}", record.stored_name, e);
            DeleteOutcome::ContentRemovalFailed(format!("{e:#}"))
        }
    };
    metrics::record_delete(outcome.label());
    Ok(outcome)
}

/// Serve stored content by its stored name.
#[utoipa::path(
    get,
    path = "/uploads/{name}",
    tag = "Files",
    params(
        ("name" = String, Path, description = "Stored file name"),
    ),
    responses(
        (status = 200, description = "Raw file content"),
        (status = 400, description = "Unsafe file name"),
        (status = 404, description = "No such file")
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    if !is_safe_stored_name(&name) {
        return Err(ApiError::bad_request("Invalid file name"));
    }
    let content = state
        .storage
        .get(&name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("stored file {name}")))?;

    let mime = mime_guess::from_path(&name).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.essence_str())
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, HeaderValue::from(content.size)),
        ],
        Body::from_stream(content.body),
    )
        .into_response())
}
