//! In-memory metadata store.
//!
//! Keeps the collection in process memory. Nothing survives a restart;
//! intended for tests and throwaway instances.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use super::store::{LoadOutcome, MetadataCollection, MetadataStore};

#[derive(Default)]
pub struct MemoryMetadataStore {
    collection: Mutex<MetadataCollection>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = LoadOutcome> + Send + '_>> {
        Box::pin(async move {
            let collection = self
                .collection
                .lock()
                .map(|c| c.clone())
                .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
            LoadOutcome::Loaded(collection)
        })
    }

    fn save<'a>(
        &'a self,
        collection: &'a MetadataCollection,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut guard = self
                .collection
                .lock()
                .map_err(|_| anyhow::anyhow!("metadata mutex poisoned"))?;
            *guard = collection.clone();
            Ok(())
        })
    }
}
