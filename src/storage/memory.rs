//! In-memory storage backend.
//!
//! Holds file content in a `HashMap` behind a mutex. Chunks are buffered
//! until the stream completes, so an aborted or oversized upload is simply
//! dropped.

use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use super::backend::{ByteStream, StorageBackend, StoredContent, WriteError};
use crate::validation::is_safe_stored_name;

#[derive(Default)]
pub struct MemoryBackend {
    files: Mutex<HashMap<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_name(name: &str) -> anyhow::Result<()> {
        if !is_safe_stored_name(name) {
            anyhow::bail!("Unsafe stored name: {:?}", name);
        }
        Ok(())
    }

    fn files(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, Bytes>>> {
        self.files
            .lock()
            .map_err(|_| anyhow::anyhow!("storage mutex poisoned"))
    }
}

impl StorageBackend for MemoryBackend {
    fn write_stream<'a>(
        &'a self,
        name: &'a str,
        mut body: ByteStream<'a>,
        limit: u64,
    ) -> Pin<Box<dyn Future<Output = Result<u64, WriteError>> + Send + 'a>> {
        Box::pin(async move {
            Self::check_name(name)?;
            let taken = self.files()?.contains_key(name);
            if taken {
                return Err(anyhow::anyhow!("Stored name already in use: {}", name).into());
            }

            let mut buf = BytesMut::new();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(WriteError::Interrupted)?;
                if (buf.len() + chunk.len()) as u64 > limit {
                    return Err(WriteError::TooLarge { limit });
                }
                buf.extend_from_slice(&chunk);
            }

            let written = buf.len() as u64;
            self.files()?.insert(name.to_string(), buf.freeze());
            Ok(written)
        })
    }

    fn get(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredContent>>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            Self::check_name(&name)?;
            let data = self.files()?.get(&name).cloned();
            Ok(data.map(|data| StoredContent {
                size: data.len() as u64,
                body: stream::once(async move { Ok(data) }).boxed(),
            }))
        })
    }

    fn delete(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            Self::check_name(&name)?;
            Ok(self.files()?.remove(&name).is_some())
        })
    }

    fn list_names(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + '_>> {
        Box::pin(async move {
            let mut names: Vec<String> = self.files()?.keys().cloned().collect();
            names.sort();
            Ok(names)
        })
    }
}
