//! Single-writer access to the metadata collection.
//!
//! [`FileCatalog`] is the only component that talks to a
//! [`MetadataStore`].  Every mutation runs `load -> mutate -> save` while
//! holding one async mutex, so overlapping uploads and deletes serialize
//! instead of overwriting each other's changes.  Reads load the document
//! without taking the lock.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::store::{FileRecord, LoadOutcome, MetadataCollection, MetadataStore, RecoveryReason};
use crate::storage::backend::StorageBackend;

/// Disagreements between the metadata document and the content directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Stored files no record points at.
    pub orphaned_files: Vec<String>,
    /// Ids of records whose stored file is missing.
    pub missing_content: Vec<String>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_files.is_empty() && self.missing_content.is_empty()
    }
}

pub struct FileCatalog {
    store: Arc<dyn MetadataStore>,
    write_lock: Mutex<()>,
}

impl FileCatalog {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Load the collection, logging when the store had to fall back to an
    /// empty one.
    pub async fn load(&self) -> LoadOutcome {
        let outcome = self.store.load().await;
        if let LoadOutcome::Recovered { reason, .. } = &outcome {
            match reason {
                RecoveryReason::Missing => debug!("Metadata document missing, using empty collection"),
                RecoveryReason::Unreadable(e) => {
                    warn!("Metadata document unreadable, using empty collection: {}", e)
                }
                RecoveryReason::Malformed(e) => {
                    warn!("Metadata document malformed, using empty collection: {}", e)
                }
            }
        }
        outcome
    }

    /// All records, newest first.
    pub async fn list(&self) -> Vec<FileRecord> {
        self.load().await.into_collection().files
    }

    /// Linear scan for the record with `id`.
    pub async fn get(&self, id: &str) -> Option<FileRecord> {
        self.load().await.into_collection().find(id).cloned()
    }

    /// Prepend `record` and persist. Returns the new record count.
    ///
    /// Refuses a record whose id or stored name is already present.
    pub async fn insert(&self, record: FileRecord) -> anyhow::Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut collection = self.load_for_write().await;
        if collection
            .files
            .iter()
            .any(|f| f.id == record.id || f.stored_name == record.stored_name)
        {
            anyhow::bail!(
                "Record {} / {} collides with an existing entry",
                record.id,
                record.stored_name
            );
        }
        collection.prepend(record);
        self.store.save(&collection).await?;
        Ok(collection.len())
    }

    /// Remove the record with `id` and persist. Returns `None` (and writes
    /// nothing) when no such record exists.
    pub async fn remove(&self, id: &str) -> anyhow::Result<Option<FileRecord>> {
        let _guard = self.write_lock.lock().await;
        let mut collection = self.load_for_write().await;
        let removed = match collection.remove(id) {
            Some(r) => r,
            None => return Ok(None),
        };
        self.store.save(&collection).await?;
        Ok(Some(removed))
    }

    /// Compare records against the files actually present in `storage`.
    pub async fn reconcile(&self, storage: &dyn StorageBackend) -> anyhow::Result<ReconcileReport> {
        let collection = self.load().await.into_collection();
        let on_disk: HashSet<String> = storage.list_names().await?.into_iter().collect();
        let referenced: HashSet<&str> = collection
            .files
            .iter()
            .map(|f| f.stored_name.as_str())
            .collect();

        let mut orphaned_files: Vec<String> = on_disk
            .iter()
            .filter(|name| !referenced.contains(name.as_str()))
            .cloned()
            .collect();
        orphaned_files.sort();

        let missing_content = collection
            .files
            .iter()
            .filter(|f| !on_disk.contains(&f.stored_name))
            .map(|f| f.id.clone())
            .collect();

        Ok(ReconcileReport {
            orphaned_files,
            missing_content,
        })
    }

    async fn load_for_write(&self) -> MetadataCollection {
        let outcome = self.load().await;
        if let LoadOutcome::Recovered {
            reason: RecoveryReason::Malformed(_) | RecoveryReason::Unreadable(_),
            ..
        } = &outcome
        {
            warn!("Next save will replace the damaged metadata document");
        }
        outcome.into_collection()
    }
}
