//! Configuration loading and types for Cloudnest.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section is optional; missing keys fall back
//! to the `default_*` functions at the bottom of this module.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Where uploaded file content lives.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Where the metadata document lives.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Upload validation limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Optional static token guarding destructive operations.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Per-client request throttling.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Attach a permissive CORS layer.
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: true,
        }
    }
}

/// Content storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `local` or `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Directory holding uploaded files (local backend only).
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            upload_dir: default_upload_dir(),
        }
    }
}

/// Metadata document configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Engine type: `json` or `memory`.
    #[serde(default = "default_metadata_engine")]
    pub engine: String,

    /// Path to the JSON metadata document.
    #[serde(default = "default_metadata_path")]
    pub path: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            engine: default_metadata_engine(),
            path: default_metadata_path(),
        }
    }
}

/// Upload validation limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted file size in bytes (inclusive).
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum size of the `metadata` form field in bytes.
    #[serde(default = "default_max_metadata_bytes")]
    pub max_metadata_bytes: usize,

    /// Accepted MIME types. Entries may be exact (`application/pdf`),
    /// a type wildcard (`image/*`) or `*/*`.
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_metadata_bytes: default_max_metadata_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Static token. When absent, deletes are unauthenticated.
    #[serde(default, alias = "api_key")]
    pub token: Option<String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Whether throttling is applied at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Length of the window in seconds.
    #[serde(default = "default_rate_window")]
    pub window_secs: u64,

    /// Requests allowed per client within one window.
    #[serde(default = "default_rate_max")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: default_rate_window(),
            max_requests: default_rate_max(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_upload_dir() -> String {
    "./uploads".to_string()
}

fn default_metadata_engine() -> String {
    "json".to_string()
}

fn default_metadata_path() -> String {
    "./metadata.json".to_string()
}

fn default_max_file_size() -> u64 {
    52_428_800 // 50 MiB
}

fn default_max_metadata_bytes() -> usize {
    65_536
}

fn default_allowed_mime_types() -> Vec<String> {
    [
        "image/*",
        "application/pdf",
        "text/plain",
        "text/csv",
        "application/json",
        "application/zip",
        "application/octet-stream",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_rate_window() -> u64 {
    900
}

fn default_rate_max() -> u32 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.storage.backend, "local");
        assert_eq!(config.metadata.path, "./metadata.json");
        assert_eq!(config.limits.max_file_size, 52_428_800);
        assert!(config.auth.token.is_none());
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let yaml = r#"
limits:
  max_file_size: 1024
  allowed_mime_types: ["text/plain"]
auth:
  token: secret
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.limits.max_file_size, 1024);
        assert_eq!(config.limits.allowed_mime_types, vec!["text/plain"]);
        assert_eq!(config.limits.max_metadata_bytes, 65_536);
        assert_eq!(config.auth.token.as_deref(), Some("secret"));
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_example_config() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/cloudnest.example.yaml");
        let config = load_config(path).unwrap();
        assert_eq!(config.server.port, 4000);
        assert!(config.auth.token.is_none());
        assert!(config
            .limits
            .allowed_mime_types
            .iter()
            .any(|m| m == "image/*"));
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(load_config("/definitely/not/here.yaml").is_err());
    }
}
