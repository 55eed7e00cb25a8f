//! Validation boundary for client-declared upload fields.
//!
//! Content type, original file name and user metadata arrive untrusted.
//! They are normalized here before they reach the catalog or the
//! filesystem; everything downstream works with server-generated names.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::ApiError;

/// Content type assumed when a file part carries none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MAX_NAME_COMPONENT: usize = 100;
const MAX_STORED_NAME: usize = 255;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Reduce a declared content type to its lower-cased essence
/// (`Text/Plain; charset=utf-8` -> `text/plain`).
pub fn normalize_mime(declared: Option<&str>) -> String {
    let essence = declared
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if essence.is_empty() {
        DEFAULT_MIME_TYPE.to_string()
    } else {
        essence
    }
}

/// Check a normalized MIME type against the allow-list.
///
/// Entries match exactly, by type wildcard (`image/*`), or `*/*`.
pub fn mime_allowed(mime: &str, allowed: &[String]) -> bool {
    let (top, _) = mime.split_once('/').unwrap_or((mime, ""));
    allowed.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        if entry == "*/*" || entry == mime {
            return true;
        }
        match entry.strip_suffix("/*") {
            Some(prefix) => prefix == top,
            None => false,
        }
    })
}

/// Clean a client-supplied display name: control characters removed,
/// whitespace trimmed, `"file"` when nothing is left.
pub fn sanitize_original_name(raw: Option<&str>) -> String {
    let cleaned: String = raw
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Derive the filesystem-safe tail of a stored name from a display name.
///
/// Keeps only the last path component, maps everything outside
/// `[A-Za-z0-9._-]` to `_`, strips leading dots and caps the length.
pub fn name_component(original: &str) -> String {
    let last = original
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(original);
    let mapped: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = mapped.trim_start_matches('.').replace("..", "_");
    let capped: String = trimmed.chars().take(MAX_NAME_COMPONENT).collect();
    if capped.is_empty() {
        "file".to_string()
    } else {
        capped
    }
}

/// Generate a stored name: `<unix-millis>-<sequence>-<random>-<name>`.
///
/// The process-wide sequence makes names unique within one process; the
/// random part separates processes that start within the same millisecond.
pub fn generate_stored_name(original: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let random: u32 = rand::random();
    format!("{millis}-{seq}-{random}-{}", name_component(original))
}

/// Generate an opaque record id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Whether `name` can be used as a file name inside the upload directory.
///
/// Rejects empty names, path separators, parent-directory sequences, NUL
/// and hidden names (which also covers the `.tmp` staging area).
pub fn is_safe_stored_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_STORED_NAME
        && !name.starts_with('.')
        && !name.contains("..")
        && !name.chars().any(|c| c == '/' || c == '\\' || c == '\0')
}

/// Parse the optional `metadata` form field.
///
/// Absent or blank input yields `{}`. Anything else must be a JSON object.
pub fn parse_user_metadata(raw: Option<&str>) -> Result<serde_json::Value, ApiError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(serde_json::Value::Object(serde_json::Map::new())),
        Some(r) => r,
    };
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ApiError::bad_request(format!("Invalid metadata JSON: {e}")))?;
    if !value.is_object() {
        return Err(ApiError::bad_request("Metadata must be a JSON object"));
    }
    Ok(value)
}
