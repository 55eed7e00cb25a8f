//! Static token authentication for destructive operations.
//!
//! When `auth.token` is configured, requests that modify the catalog
//! other than uploads must present the token either as
//! `Authorization: Bearer <token>` or in an `x-api-key` header.  When no
//! token is configured every request passes.

use axum::extract::State;
use axum::http::{HeaderMap, Method, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::errors::ApiError;
use crate::AppState;

/// Header carrying the token when a bearer `Authorization` is not used.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Constant-time string comparison to prevent timing attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Pull the presented token out of the request headers.
///
/// A bearer `Authorization` header wins over `x-api-key`.
pub fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, rest) = v.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| rest.trim())
        });
    bearer.or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    })
}

/// Check `headers` against the configured token.
pub fn authorize(expected: Option<&str>, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = match expected {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(()),
    };
    match presented_token(headers) {
        Some(given) if constant_time_eq(given, expected) => Ok(()),
        Some(_) => {
            debug!("Rejected request with wrong token");
            Err(ApiError::Unauthorized)
        }
        None => {
            debug!("Rejected request without token");
            Err(ApiError::Unauthorized)
        }
    }
}

/// Middleware enforcing the token on `DELETE` requests.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if req.method() == Method::DELETE {
        authorize(state.config.auth.token.as_deref(), req.headers())?;
    }
    Ok(next.run(req).await)
}
