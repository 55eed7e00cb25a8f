//! `POST /upload` -- multipart file ingestion.
//!
//! An upload runs in two phases.  Staging streams the `file` part into
//! storage and reads the optional `metadata` part; nothing is visible to
//! readers yet.  Committing builds the [`FileRecord`] and prepends it
//! through the catalog.  A failure during staging removes the stored
//! content again; a failure during commit leaves it orphaned on disk.

use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::Json;
use chrono::SecondsFormat;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::errors::ApiError;
use crate::metadata::store::FileRecord;
use crate::metrics;
use crate::storage::backend::WriteError;
use crate::validation::{
    generate_id, generate_stored_name, mime_allowed, normalize_mime, parse_user_metadata,
    sanitize_original_name,
};
use crate::AppState;

/// Body of a successful upload.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub file: FileRecord,
}

/// Multipart form accepted by `POST /upload`. Documentation only.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// File content. The part's filename and content type are recorded.
    #[schema(value_type = String)]
    file: Vec<u8>,
    /// JSON object stored alongside the file.
    metadata: Option<String>,
}

/// File content already written to storage, not yet recorded.
#[derive(Debug)]
struct StagedFile {
    stored_name: String,
    original_name: String,
    mime_type: String,
    size: u64,
}

/// Upload a file with optional JSON metadata.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "Files",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "No file, malformed metadata or broken multipart body"),
        (status = 413, description = "File exceeds the size limit"),
        (status = 415, description = "File type not allowed"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart request: {}", e.body_text())))?;

    let mut staged: Option<StagedFile> = None;
    let user_metadata = match read_form(&state, &mut multipart, &mut staged).await {
        Ok(m) => m,
        Err(e) => {
            if let Some(file) = staged {
                discard(&state, &file.stored_name).await;
            }
            metrics::record_upload("rejected", 0);
            return Err(e);
        }
    };

    let file = match staged {
        Some(f) => f,
        None => {
            metrics::record_upload("rejected", 0);
            return Err(ApiError::bad_request("No file uploaded"));
        }
    };

    let record = FileRecord {
        id: generate_id(),
        path: format!("/uploads/{}", file.stored_name),
        stored_name: file.stored_name,
        original_name: file.original_name,
        mime_type: file.mime_type,
        size_bytes: file.size,
        uploaded_at: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        user_metadata: user_metadata
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
    };

    match state.catalog.insert(record.clone()).await {
        Ok(count) => metrics::set_file_count(count),
        Err(e) => {
            error!(
                stored_name = %record.stored_name,
                "Metadata write failed after content was stored; file is orphaned"
            );
            metrics::record_upload("failed", 0);
            return Err(ApiError::InternalError(e));
        }
    }

    info!(
        id = %record.id,
        stored_name = %record.stored_name,
        size = record.size_bytes,
        "File uploaded"
    );
    metrics::record_upload("stored", record.size_bytes);
    Ok(Json(UploadResponse {
        success: true,
        file: record,
    }))
}

/// Walk the multipart body. Stages the `file` part into `staged` and
/// returns the parsed `metadata` object, if any. Unknown parts are skipped.
///
/// Metadata is parsed as soon as its part ends, so a bad value stops the
/// walk before any later `file` part reaches storage.
async fn read_form(
    state: &AppState,
    multipart: &mut Multipart,
    staged: &mut Option<StagedFile>,
) -> Result<Option<serde_json::Value>, ApiError> {
    let mut metadata = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                debug!("Failed to read multipart field: {}", e);
                return Err(ApiError::bad_request("Invalid multipart data"));
            }
        };
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                if staged.is_some() {
                    return Err(ApiError::bad_request("Only one file may be uploaded per request"));
                }
                // A `file` part without a filename is a plain text field.
                if field.file_name().is_none() {
                    return Err(ApiError::bad_request("No file uploaded"));
                }
                *staged = Some(stage_file(state, field).await?);
            }
            Some("metadata") => {
                let limit = state.config.limits.max_metadata_bytes;
                let raw = read_capped_text(field, limit).await?;
                metadata = Some(parse_user_metadata(Some(&raw))?);
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }
    Ok(metadata)
}

/// Validate the declared type, then stream the part into storage.
async fn stage_file(state: &AppState, field: Field<'_>) -> Result<StagedFile, ApiError> {
    let mime_type = normalize_mime(field.content_type());
    if !mime_allowed(&mime_type, &state.config.limits.allowed_mime_types) {
        debug!("Rejected upload with type {}", mime_type);
        return Err(ApiError::UnsupportedMediaType { mime_type });
    }

    let original_name = sanitize_original_name(field.file_name());
    let stored_name = generate_stored_name(&original_name);
    let limit = state.config.limits.max_file_size;

    let body = field
        .map(|chunk| chunk.map_err(|e| std::io::Error::other(e.to_string())))
        .boxed();
    let size = state
        .storage
        .write_stream(&stored_name, body, limit)
        .await
        .map_err(|e| match e {
            WriteError::TooLarge { limit } => ApiError::PayloadTooLarge { limit },
            WriteError::Interrupted(e) => ApiError::bad_request(format!("Upload interrupted: {e}")),
            WriteError::Backend(e) => ApiError::InternalError(e),
        })?;

    Ok(StagedFile {
        stored_name,
        original_name,
        mime_type,
        size,
    })
}

/// Read a text part, refusing more than `limit` bytes.
async fn read_capped_text(mut field: Field<'_>, limit: usize) -> Result<String, ApiError> {
    let mut buf = Vec::new();
    loop {
        let chunk = field.chunk().await.map_err(|e| {
            debug!("Failed to read metadata field: {}", e);
            ApiError::bad_request("Invalid multipart data")
        })?;
        let Some(chunk) = chunk else { break };
        if buf.len() + chunk.len() > limit {
            return Err(ApiError::bad_request(format!(
                "Metadata exceeds {limit} bytes"
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf).map_err(|_| ApiError::bad_request("Metadata must be UTF-8"))
}

async fn discard(state: &AppState, stored_name: &str) {
    if let Err(e) = state.storage.delete(stored_name).await {
        warn!("Failed to discard staged file {}: {:#}", stored_name, e);
    }
}
