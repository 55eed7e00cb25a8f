//! API error types.
//!
//! Every variant maps to one HTTP status.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(ApiError::NotFound { .. })`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes)
}

/// Errors surfaced to API callers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing file, malformed metadata, unsafe name, broken multipart body.
    #[error("{message}")]
    BadRequest { message: String },

    /// The declared content type is not on the allow-list.
    #[error("File type {mime_type} is not allowed")]
    UnsupportedMediaType { mime_type: String },

    /// The uploaded content exceeded the configured maximum.
    #[error("File exceeds the maximum allowed size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// Unknown id or missing stored file.
    #[error("Not found")]
    NotFound { resource: String },

    /// Auth is configured and the token was absent or wrong.
    #[error("Unauthorized")]
    Unauthorized,

    /// The client exceeded its request budget.
    #[error("Too many requests, please try again later")]
    TooManyRequests,

    /// Catch-all for unexpected internal errors.
    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        ApiError::NotFound {
            resource: resource.into(),
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ApiError::InternalError(err) => {
                tracing::error!("internal error: {:#}", err);
            }
            ApiError::NotFound { resource } => {
                tracing::debug!("not found: {}", resource);
            }
            _ => {}
        }

        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();
        if matches!(self, ApiError::Unauthorized) {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}
