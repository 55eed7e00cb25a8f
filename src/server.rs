//! Axum router construction.
//!
//! The [`app`] function wires every endpoint to its handler, attaches the
//! middleware stack and returns a ready-to-serve [`axum::Router`].

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

use crate::auth::auth_middleware;
use crate::errors::generate_request_id;
use crate::handlers::{files, upload};
use crate::metadata::store::FileRecord;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::rate_limit::rate_limit_middleware;
use crate::AppState;

/// Response header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// -- OpenAPI specification ----------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cloudnest File API",
        version = "0.1.0",
        description = "Upload, list, download and delete files"
    ),
    paths(
        health_check,
        upload::upload_file,
        files::list_files,
        files::get_file,
        files::delete_file,
        files::download_file,
    ),
    components(schemas(
        FileRecord,
        upload::UploadResponse,
        upload::UploadForm,
        files::DeleteResponse,
        HealthResponse
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Files", description = "File upload and retrieval"),
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Build the axum [`Router`] with all routes and middleware.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = state.config.server.cors;

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .route("/upload", post(upload::upload_file))
        .route("/files", get(files::list_files))
        .route("/files/:id", get(files::get_file).delete(files::delete_file))
        .route("/uploads/:name", get(files::download_file))
        .with_state(state.clone())
        // Innermost: token check for deletes.
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
        .layer(middleware::from_fn(common_headers_middleware))
        // Outer: captures the full request lifecycle.
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        // Uploads are size-checked while streaming.
        .layer(DefaultBodyLimit::disable());

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id` (16 hex chars) and `server: Cloudnest` to every
/// response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key(REQUEST_ID_HEADER) {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
    }
    headers.insert("server", HeaderValue::from_static("Cloudnest"));

    response
}

// -- Infrastructure endpoints --------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Server is running", body = HealthResponse)
    )
)]
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metadata::local::JsonMetadataStore;
    use crate::metadata::memory::MemoryMetadataStore;
    use crate::storage::local::LocalBackend;
    use crate::storage::backend::{ByteStream, StorageBackend, StoredContent, WriteError};
    use crate::storage::memory::MemoryBackend;
    use axum::body::Body;
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use std::future::Future;
    use std::path::PathBuf;
    use std::pin::Pin;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "cloudnest-test-boundary";

    struct Part<'a> {
        name: &'a str,
        filename: Option<&'a str>,
        content_type: Option<&'a str>,
        data: &'a [u8],
    }

    fn file_part<'a>(filename: &'a str, content_type: &'a str, data: &'a [u8]) -> Part<'a> {
        Part {
            name: "file",
            filename: Some(filename),
            content_type: Some(content_type),
            data,
        }
    }

    fn text_part<'a>(name: &'a str, value: &'a str) -> Part<'a> {
        Part {
            name,
            filename: None,
            content_type: None,
            data: value.as_bytes(),
        }
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
            if let Some(f) = part.filename {
                disposition.push_str(&format!("; filename=\"{f}\""));
            }
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"\r\n");
            if let Some(ct) = part.content_type {
                body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.rate_limit.enabled = false;
        config.limits.max_file_size = 16;
        config
    }

    /// State backed by a real upload directory and metadata document.
    struct DiskFixture {
        _tmp: TempDir,
        upload_dir: PathBuf,
        metadata_path: PathBuf,
        state: Arc<AppState>,
    }

    impl DiskFixture {
        fn new(config: Config) -> Self {
            let tmp = TempDir::new().unwrap();
            let upload_dir = tmp.path().join("uploads");
            let metadata_path = tmp.path().join("metadata.json");
            let state = Arc::new(AppState::new(
                config,
                Arc::new(JsonMetadataStore::new(&metadata_path).unwrap()),
                Arc::new(LocalBackend::new(&upload_dir).unwrap()),
            ));
            Self {
                _tmp: tmp,
                upload_dir,
                metadata_path,
                state,
            }
        }

        /// Every entry in the upload directory, including staged temp files.
        fn dir_entries(&self) -> Vec<String> {
            let mut names = Vec::new();
            for dir in [self.upload_dir.clone(), self.upload_dir.join(".tmp")] {
                for entry in std::fs::read_dir(dir).unwrap() {
                    let entry = entry.unwrap();
                    if entry.file_type().unwrap().is_file() {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
            }
            names.sort();
            names
        }

        fn metadata_document(&self) -> String {
            std::fs::read_to_string(&self.metadata_path).unwrap()
        }
    }

    fn memory_state(config: Config) -> Arc<AppState> {
        Arc::new(AppState::new(
            config,
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBackend::new()),
        ))
    }

    /// Memory backend whose deletes always fail.
    struct FailingDeleteBackend {
        inner: MemoryBackend,
    }

    impl StorageBackend for FailingDeleteBackend {
        fn write_stream<'a>(
            &'a self,
            name: &'a str,
            body: ByteStream<'a>,
            limit: u64,
        ) -> Pin<Box<dyn Future<Output = Result<u64, WriteError>> + Send + 'a>> {
            self.inner.write_stream(name, body, limit)
        }

        fn get(
            &self,
            name: &str,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredContent>>> + Send + '_>>
        {
            self.inner.get(name)
        }

        fn delete(
            &self,
            _name: &str,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
            Box::pin(async { Err(anyhow::anyhow!("permission denied")) })
        }

        fn list_names(
            &self,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + '_>> {
            self.inner.list_names()
        }
    }

    fn failing_delete_state(config: Config) -> Arc<AppState> {
        Arc::new(AppState::new(
            config,
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(FailingDeleteBackend {
                inner: MemoryBackend::new(),
            }),
        ))
    }

    async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = app(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn send_json(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(state, req).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_upload_then_list_puts_record_first() {
        let fx = DiskFixture::new(test_config());

        let (status, first) = send_json(
            &fx.state,
            upload_request(&[file_part("a.txt", "text/plain", b"hello")]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["success"], json!(true));
        assert_eq!(first["file"]["size"], json!(5));
        assert_eq!(first["file"]["originalname"], json!("a.txt"));
        assert_eq!(first["file"]["mimetype"], json!("text/plain"));
        assert_eq!(first["file"]["metadata"], json!({}));

        let (_, second) = send_json(
            &fx.state,
            upload_request(&[
                file_part("b.png", "image/png", b"\x89PNG1234"),
                text_part("metadata", r#"{"owner": "kim"}"#),
            ]),
        )
        .await;
        assert_eq!(second["file"]["size"], json!(8));
        assert_eq!(second["file"]["metadata"], json!({"owner": "kim"}));

        let (status, list) = send_json(&fx.state, request("GET", "/files")).await;
        assert_eq!(status, StatusCode::OK);
        let list = list.as_array().unwrap().clone();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0], second["file"]);
        assert_eq!(list[1], first["file"]);

        let stored = first["file"]["filename"].as_str().unwrap();
        assert_eq!(
            std::fs::read(fx.upload_dir.join(stored)).unwrap(),
            b"hello".to_vec()
        );
        assert_eq!(
            first["file"]["path"],
            json!(format!("/uploads/{stored}"))
        );
    }

    #[tokio::test]
    async fn test_get_by_id_matches_upload_response() {
        let state = memory_state(test_config());
        let (_, uploaded) = send_json(
            &state,
            upload_request(&[file_part("a.txt", "text/plain", b"abc")]),
        )
        .await;
        let id = uploaded["file"]["id"].as_str().unwrap();

        let (status, fetched) = send_json(&state, request("GET", &format!("/files/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, uploaded["file"]);
    }

    #[tokio::test]
    async fn test_disallowed_type_changes_nothing() {
        let fx = DiskFixture::new(test_config());
        let doc_before = fx.metadata_document();

        let (status, body) = send_json(
            &fx.state,
            upload_request(&[file_part("x.exe", "application/x-msdownload", b"MZ")]),
        )
        .await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body["error"].as_str().unwrap().contains("application/x-msdownload"));
        assert!(fx.dir_entries().is_empty());
        assert_eq!(fx.metadata_document(), doc_before);
    }

    #[tokio::test]
    async fn test_oversized_upload_leaves_no_partial_file() {
        let fx = DiskFixture::new(test_config());
        let doc_before = fx.metadata_document();

        let big = vec![b'x'; 17];
        let (status, _) = send_json(
            &fx.state,
            upload_request(&[file_part("big.txt", "text/plain", &big)]),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(fx.dir_entries().is_empty());
        assert_eq!(fx.metadata_document(), doc_before);
    }

    #[tokio::test]
    async fn test_upload_at_exact_limit_is_accepted() {
        let state = memory_state(test_config());
        let exact = vec![b'x'; 16];
        let (status, body) = send_json(
            &state,
            upload_request(&[file_part("edge.txt", "text/plain", &exact)]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["file"]["size"], json!(16));
    }

    #[tokio::test]
    async fn test_bad_metadata_discards_stored_file() {
        let fx = DiskFixture::new(test_config());

        for bad in ["{not json", "[1, 2]"] {
            let (status, _) = send_json(
                &fx.state,
                upload_request(&[
                    file_part("a.txt", "text/plain", b"hi"),
                    text_part("metadata", bad),
                ]),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert!(fx.dir_entries().is_empty());
        assert!(fx.state.catalog.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_before_file_is_accepted() {
        let state = memory_state(test_config());
        let (status, body) = send_json(
            &state,
            upload_request(&[
                text_part("metadata", r#"{"k": 1}"#),
                text_part("note", "ignored"),
                file_part("a.txt", "text/plain", b"hi"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["file"]["metadata"], json!({"k": 1}));
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request() {
        let state = memory_state(test_config());
        let (status, body) =
            send_json(&state, upload_request(&[text_part("metadata", "{}")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "No file uploaded"}));
    }

    #[tokio::test]
    async fn test_second_file_part_is_rejected_and_cleaned_up() {
        let fx = DiskFixture::new(test_config());
        let (status, _) = send_json(
            &fx.state,
            upload_request(&[
                file_part("a.txt", "text/plain", b"one"),
                file_part("b.txt", "text/plain", b"two"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(fx.dir_entries().is_empty());
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_bad_request() {
        let state = memory_state(test_config());
        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body) = send_json(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_original_name_is_not_used_as_a_path() {
        let fx = DiskFixture::new(test_config());
        let (status, body) = send_json(
            &fx.state,
            upload_request(&[file_part("../../evil.txt", "text/plain", b"x")]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let stored = body["file"]["filename"].as_str().unwrap();
        assert!(stored.ends_with("-evil.txt"));
        assert_eq!(fx.dir_entries(), vec![stored.to_string()]);
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_content() {
        let fx = DiskFixture::new(test_config());
        let (_, uploaded) = send_json(
            &fx.state,
            upload_request(&[file_part("a.txt", "text/plain", b"bye")]),
        )
        .await;
        let id = uploaded["file"]["id"].as_str().unwrap();

        let (status, body) = send_json(&fx.state, request("DELETE", &format!("/files/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));

        let (_, list) = send_json(&fx.state, request("GET", "/files")).await;
        assert_eq!(list, json!([]));
        let (status, _) = send_json(&fx.state, request("GET", &format!("/files/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(fx.dir_entries().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_id_leaves_collection_unchanged() {
        let fx = DiskFixture::new(test_config());
        send(
            &fx.state,
            upload_request(&[file_part("a.txt", "text/plain", b"keep")]),
        )
        .await;
        let doc_before = fx.metadata_document();

        let (status, body) = send_json(&fx.state, request("DELETE", "/files/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Not found"}));
        assert_eq!(fx.metadata_document(), doc_before);
    }

    #[tokio::test]
    async fn test_delete_with_missing_content_still_succeeds() {
        let fx = DiskFixture::new(test_config());
        let (_, uploaded) = send_json(
            &fx.state,
            upload_request(&[file_part("a.txt", "text/plain", b"x")]),
        )
        .await;
        let stored = uploaded["file"]["filename"].as_str().unwrap();
        std::fs::remove_file(fx.upload_dir.join(stored)).unwrap();

        let id = uploaded["file"]["id"].as_str().unwrap();
        let outcome = files::remove_file(&fx.state, id).await.unwrap();
        assert_eq!(outcome, files::DeleteOutcome::ContentMissing);
        assert!(fx.state.catalog.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_token_when_configured() {
        let mut config = test_config();
        config.auth.token = Some("s3cret".to_string());
        let state = memory_state(config);
        let (_, uploaded) = send_json(
            &state,
            upload_request(&[file_part("a.txt", "text/plain", b"x")]),
        )
        .await;
        let uri = format!("/files/{}", uploaded["file"]["id"].as_str().unwrap());

        let resp = app(state.clone())
            .oneshot(request("DELETE", &uri))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()["www-authenticate"], "Bearer");

        let (status, _) = send(&state, request("GET", &uri)).await;
        assert_eq!(status, StatusCode::OK);

        let authed = Request::builder()
            .method("DELETE")
            .uri(&uri)
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, authed).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_download_serves_content_with_guessed_type() {
        let state = memory_state(test_config());
        let (_, uploaded) = send_json(
            &state,
            upload_request(&[file_part("notes.txt", "text/plain", b"hello")]),
        )
        .await;
        let path = uploaded["file"]["path"].as_str().unwrap();

        let resp = app(state.clone())
            .oneshot(request("GET", path))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/plain");
        assert_eq!(resp.headers()["content-length"], "5");
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_download_unknown_and_unsafe_names() {
        let state = memory_state(test_config());
        let (status, _) = send(&state, request("GET", "/uploads/1-0-1-missing.txt")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, request("GET", "/uploads/..%2Fmetadata.json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, request("GET", "/uploads/.tmp")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_common_headers_on_success_and_error() {
        let state = memory_state(test_config());
        for uri in ["/health", "/files/missing"] {
            let resp = app(state.clone()).oneshot(request("GET", uri)).await.unwrap();
            let id = resp.headers()[REQUEST_ID_HEADER].to_str().unwrap();
            assert_eq!(id.len(), 16);
            assert_eq!(resp.headers()["server"], "Cloudnest");
        }
    }

    #[tokio::test]
    async fn test_health_and_openapi() {
        let state = memory_state(test_config());
        let (status, body) = send_json(&state, request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (status, doc) = send_json(&state, request("GET", "/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/upload"]["post"].is_object());
        assert!(doc["paths"]["/files/{id}"]["delete"].is_object());
    }

    #[tokio::test]
    async fn test_metrics_disabled_returns_503() {
        let mut config = test_config();
        config.observability.metrics = false;
        let state = memory_state(config);
        let (status, _) = send(&state, request("GET", "/metrics")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_excess_but_not_health() {
        let mut config = test_config();
        config.rate_limit.enabled = true;
        config.rate_limit.max_requests = 2;
        let state = memory_state(config);

        assert_eq!(send(&state, request("GET", "/files")).await.0, StatusCode::OK);
        assert_eq!(send(&state, request("GET", "/files")).await.0, StatusCode::OK);
        let (status, body) = send_json(&state, request("GET", "/files")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["error"].is_string());
        assert_eq!(send(&state, request("GET", "/health")).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_are_all_recorded() {
        let fx = DiskFixture::new(test_config());
        let mut handles = Vec::new();
        for i in 0..20 {
            let state = fx.state.clone();
            handles.push(tokio::spawn(async move {
                let name = format!("f{i}.txt");
                let resp = app(state)
                    .oneshot(upload_request(&[file_part(&name, "text/plain", b"data")]))
                    .await
                    .unwrap();
                resp.status()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), StatusCode::OK);
        }
        assert_eq!(fx.state.catalog.list().await.len(), 20);
        assert_eq!(fx.dir_entries().len(), 20);
    }

    #[tokio::test]
    async fn test_metadata_key_order_survives_upload() {
        let fx = DiskFixture::new(test_config());
        let (status, body) = send(
            &fx.state,
            upload_request(&[
                file_part("a.txt", "text/plain", b"hi"),
                text_part("metadata", r#"{"zeta": 1, "alpha": 2, "mid": 3}"#),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains(r#""metadata":{"zeta":1,"alpha":2,"mid":3}"#));

        let doc = fx.metadata_document();
        let zeta = doc.find("\"zeta\"").unwrap();
        let alpha = doc.find("\"alpha\"").unwrap();
        let mid = doc.find("\"mid\"").unwrap();
        assert!(zeta < alpha && alpha < mid);
    }

    #[tokio::test]
    async fn test_delete_when_content_removal_fails_still_drops_record() {
        let state = failing_delete_state(test_config());
        let (_, first) = send_json(
            &state,
            upload_request(&[file_part("a.txt", "text/plain", b"one")]),
        )
        .await;
        let (_, second) = send_json(
            &state,
            upload_request(&[file_part("b.txt", "text/plain", b"two")]),
        )
        .await;

        let id = first["file"]["id"].as_str().unwrap();
        let outcome = files::remove_file(&state, id).await.unwrap();
        assert!(matches!(outcome, files::DeleteOutcome::ContentRemovalFailed(_)));
        assert_eq!(state.catalog.list().await.len(), 1);

        let id = second["file"]["id"].as_str().unwrap();
        let (status, body) = send_json(&state, request("DELETE", &format!("/files/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));
        assert!(state.catalog.list().await.is_empty());
        assert_eq!(state.storage.list_names().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_field_without_filename_is_not_a_file() {
        let fx = DiskFixture::new(test_config());
        let (status, body) = send_json(
            &fx.state,
            upload_request(&[text_part("file", "not a file")]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "No file uploaded"}));
        assert!(fx.dir_entries().is_empty());
        assert!(fx.state.catalog.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_metadata_before_file_stores_nothing() {
        let state = failing_delete_state(test_config());
        let (status, _) = send_json(
            &state,
            upload_request(&[
                text_part("metadata", "{not json"),
                file_part("a.txt", "text/plain", b"hi"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.storage.list_names().await.unwrap().is_empty());
        assert!(state.catalog.list().await.is_empty());
    }
}
