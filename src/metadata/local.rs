//! Local JSON document metadata store.
//!
//! The whole collection lives in one pretty-printed JSON file of the form
//! `{"files": [...]}`.  Every save rewrites the document: the new content
//! goes to a temp file in the same directory, is fsynced, then renamed over
//! the old document, so readers see either the old or the new version.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tempfile::NamedTempFile;
use tracing::info;

use super::store::{LoadOutcome, MetadataCollection, MetadataStore, RecoveryReason};

/// Stores the metadata collection as a JSON file on the local filesystem.
pub struct JsonMetadataStore {
    path: PathBuf,
}

impl JsonMetadataStore {
    /// Open the document at `path`, creating `{"files": []}` (and any
    /// missing parent directories) if it does not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(parent_dir(&path))?;
        let store = Self { path };
        if !store.path.exists() {
            write_document(&store.path, &MetadataCollection::default())?;
            info!("Created empty metadata document at {}", store.path.display());
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataStore for JsonMetadataStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = LoadOutcome> + Send + '_>> {
        Box::pin(async move { read_document(&self.path) })
    }

    fn save<'a>(
        &'a self,
        collection: &'a MetadataCollection,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move { write_document(&self.path, collection) })
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn read_document(path: &Path) -> LoadOutcome {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return LoadOutcome::recovered(RecoveryReason::Missing);
        }
        Err(e) => return LoadOutcome::recovered(RecoveryReason::Unreadable(e.to_string())),
    };
    match serde_json::from_slice::<MetadataCollection>(&bytes) {
        Ok(collection) => LoadOutcome::Loaded(collection),
        Err(e) => LoadOutcome::recovered(RecoveryReason::Malformed(e.to_string())),
    }
}

fn write_document(path: &Path, collection: &MetadataCollection) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(collection)?;
    let mut temp = NamedTempFile::new_in(parent_dir(path))?;
    temp.write_all(&json)?;
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}
