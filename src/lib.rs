//! Cloudnest library -- a small file upload server.
//!
//! Uploaded content lives in a flat directory under server-generated
//! names; a single JSON document records what was uploaded.  This crate
//! provides the HTTP surface, the metadata catalog and the pluggable
//! content and metadata backends.

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metadata;
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod storage;
pub mod validation;

use crate::config::Config;
use crate::metadata::catalog::FileCatalog;
use crate::metadata::store::MetadataStore;
use crate::rate_limit::ClientRateLimiter;
use crate::storage::backend::StorageBackend;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Single-writer view of the metadata document.
    pub catalog: FileCatalog,
    /// Where uploaded bytes live.
    pub storage: Arc<dyn StorageBackend>,
    /// Per-client throttle, absent when disabled.
    pub rate_limiter: Option<Arc<ClientRateLimiter>>,
}

impl AppState {
    pub fn new(
        config: Config,
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        let rate_limiter = rate_limit::build_limiter(&config.rate_limit);
        Self {
            config,
            catalog: FileCatalog::new(metadata),
            storage,
            rate_limiter,
        }
    }
}

/// Open the backends named in `config` and assemble the state.
pub fn build_state(config: Config) -> anyhow::Result<AppState> {
    let metadata: Arc<dyn MetadataStore> = match config.metadata.engine.as_str() {
        "json" => Arc::new(metadata::local::JsonMetadataStore::new(&config.metadata.path)?),
        "memory" => Arc::new(metadata::memory::MemoryMetadataStore::new()),
        other => anyhow::bail!("Unknown metadata engine: {other}"),
    };
    let storage: Arc<dyn StorageBackend> = match config.storage.backend.as_str() {
        "local" => Arc::new(storage::local::LocalBackend::new(&config.storage.upload_dir)?),
        "memory" => Arc::new(storage::memory::MemoryBackend::new()),
        other => anyhow::bail!("Unknown storage backend: {other}"),
    };
    Ok(AppState::new(config, metadata, storage))
}
