//! Prometheus metrics for Cloudnest.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::AppState;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "cloudnest_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "cloudnest_http_request_duration_seconds";

/// Upload attempts (counter). Labels: outcome.
pub const UPLOADS_TOTAL: &str = "cloudnest_uploads_total";

/// Bytes accepted into storage by successful uploads (counter).
pub const UPLOADED_BYTES_TOTAL: &str = "cloudnest_uploaded_bytes_total";

/// Delete attempts (counter). Labels: outcome.
pub const DELETES_TOTAL: &str = "cloudnest_deletes_total";

/// Records in the metadata document after the last write (gauge).
pub const FILES_TOTAL: &str = "cloudnest_files_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Idempotent.
///
/// Returns `None` when another recorder already owns the global slot.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Some(handle);
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
        }
        Err(e) => tracing::warn!("Prometheus recorder not installed: {}", e),
    }
    PROMETHEUS_HANDLE.get()
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(UPLOADS_TOTAL, "Upload attempts by outcome");
    describe_counter!(UPLOADED_BYTES_TOTAL, "Bytes stored by successful uploads");
    describe_counter!(DELETES_TOTAL, "Delete attempts by outcome");
    describe_gauge!(FILES_TOTAL, "Records in the metadata document");
}

// -- Domain helpers -----------------------------------------------------------

pub fn record_upload(outcome: &'static str, bytes: u64) {
    counter!(UPLOADS_TOTAL, "outcome" => outcome).increment(1);
    if bytes > 0 {
        counter!(UPLOADED_BYTES_TOTAL).increment(bytes);
    }
}

pub fn record_delete(outcome: &'static str) {
    counter!(DELETES_TOTAL, "outcome" => outcome).increment(1);
    if outcome != "not_found" {
        gauge!(FILES_TOTAL).decrement(1.0);
    }
}

pub fn set_file_count(count: usize) {
    gauge!(FILES_TOTAL).set(count as f64);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize a request path to its route template for metric labels.
///
/// - `/files/abc123` -> `/files/{id}`
/// - `/uploads/1700-0-1-a.txt` -> `/uploads/{name}`
/// - anything unrouted -> `/other`
fn normalize_path(path: &str) -> String {
    match path {
        "/upload" | "/files" | "/health" | "/metrics" | "/openapi.json" => path.to_string(),
        _ if path.starts_with("/files/") => "/files/{id}".to_string(),
        _ if path.starts_with("/uploads/") => "/uploads/{name}".to_string(),
        _ => "/other".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
///
/// 503 when metrics are disabled in config or no recorder is installed.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let handle = PROMETHEUS_HANDLE
        .get()
        .filter(|_| state.config.observability.metrics);
    match handle {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled").into_response(),
    }
}
