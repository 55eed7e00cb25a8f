//! Metadata record types and the abstract store trait.
//!
//! A store persists one [`MetadataCollection`] as a whole document.  It
//! offers exactly two operations, [`MetadataStore::load`] and
//! [`MetadataStore::save`]; read-modify-write sequencing lives in
//! [`super::catalog::FileCatalog`].

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use utoipa::ToSchema;

// ── Record types ───────────────────────────────────────────────────

/// Metadata for one stored file.
///
/// The serialized field names are the wire format shared by the HTTP API
/// and the metadata document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    /// Opaque unique identifier used by `/files/:id`.
    pub id: String,
    /// Server-generated on-disk name.
    #[serde(rename = "filename")]
    pub stored_name: String,
    /// Client-supplied name, display only.
    #[serde(rename = "originalname")]
    pub original_name: String,
    /// Client-declared content type.
    #[serde(rename = "mimetype")]
    pub mime_type: String,
    /// Bytes actually written to storage.
    #[serde(rename = "size")]
    pub size_bytes: u64,
    /// Download path, `/uploads/<filename>`.
    pub path: String,
    /// ISO-8601 UTC creation time with millisecond precision.
    #[serde(rename = "uploadedAt")]
    pub uploaded_at: String,
    /// Client-supplied JSON object, stored verbatim.
    #[serde(rename = "metadata", default = "empty_object")]
    #[schema(value_type = Object)]
    pub user_metadata: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// The full metadata document: records ordered newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataCollection {
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

impl MetadataCollection {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.id == id)
    }

    /// Insert `record` at the head of the collection.
    pub fn prepend(&mut self, record: FileRecord) {
        self.files.insert(0, record);
    }

    /// Remove and return the record with `id`, if any.
    pub fn remove(&mut self, id: &str) -> Option<FileRecord> {
        let idx = self.files.iter().position(|f| f.id == id)?;
        Some(self.files.remove(idx))
    }
}

// ── Load outcome ───────────────────────────────────────────────────

/// Why a load fell back to an empty collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryReason {
    /// The backing document does not exist.
    Missing,
    /// The document exists but could not be read.
    Unreadable(String),
    /// The document was read but did not parse.
    Malformed(String),
}

/// Result of [`MetadataStore::load`].
///
/// Loading never fails: a damaged document yields `Recovered` with an
/// empty collection so the service stays up.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(MetadataCollection),
    Recovered {
        collection: MetadataCollection,
        reason: RecoveryReason,
    },
}

impl LoadOutcome {
    pub fn recovered(reason: RecoveryReason) -> Self {
        LoadOutcome::Recovered {
            collection: MetadataCollection::default(),
            reason,
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, LoadOutcome::Recovered { .. })
    }

    pub fn collection(&self) -> &MetadataCollection {
        match self {
            LoadOutcome::Loaded(c) => c,
            LoadOutcome::Recovered { collection, .. } => collection,
        }
    }

    pub fn into_collection(self) -> MetadataCollection {
        match self {
            LoadOutcome::Loaded(c) => c,
            LoadOutcome::Recovered { collection, .. } => collection,
        }
    }
}

// ── Trait ───────────────────────────────────────────────────────────

/// Whole-document metadata persistence.
pub trait MetadataStore: Send + Sync + 'static {
    /// Read the full collection. Absent or damaged documents yield
    /// [`LoadOutcome::Recovered`].
    fn load(&self) -> Pin<Box<dyn Future<Output = LoadOutcome> + Send + '_>>;

    /// Overwrite the backing document with `collection`.
    fn save<'a>(
        &'a self,
        collection: &'a MetadataCollection,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}


#[cfg(test)]
pub(crate) use tests::make_record;
