//! Abstract storage backend trait.
//!
//! Every content backend must implement [`StorageBackend`].  Content is
//! addressed by its server-generated stored name; the trait never sees
//! client-supplied paths.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A chunked body being written to or read from storage.
pub type ByteStream<'a> = BoxStream<'a, std::io::Result<Bytes>>;

/// Stored file content, opened for streaming.
pub struct StoredContent {
    /// Length of the file in bytes.
    pub size: u64,
    /// The file's bytes, chunk by chunk.
    pub body: ByteStream<'static>,
}

impl std::fmt::Debug for StoredContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredContent")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl StoredContent {
    /// Drain the body into one buffer.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        use futures::TryStreamExt;
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(chunks.concat().into())
    }
}

/// Why a streamed write did not produce a stored file.
///
/// In every case the backend has already discarded whatever it had
/// written so far.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The stream produced more than `limit` bytes.
    #[error("content exceeds the {limit}-byte limit")]
    TooLarge { limit: u64 },

    /// The body stream failed before completing (client went away,
    /// malformed multipart framing).
    #[error("content stream interrupted: {0}")]
    Interrupted(std::io::Error),

    /// The backend itself failed.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Async content storage contract.
pub trait StorageBackend: Send + Sync + 'static {
    /// Consume `body` into a new file called `name`, returning the number
    /// of bytes written. Fails with [`WriteError::TooLarge`] as soon as the
    /// running total exceeds `limit`.
    fn write_stream<'a>(
        &'a self,
        name: &'a str,
        body: ByteStream<'a>,
        limit: u64,
    ) -> Pin<Box<dyn Future<Output = Result<u64, WriteError>> + Send + 'a>>;

    /// Open the file called `name` for streaming, or `None` if it does not exist.
    fn get(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredContent>>> + Send + '_>>;

    /// Delete the file called `name`. Returns `false` if it was already gone.
    fn delete(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;

    /// List the names of all stored files, sorted.
    fn list_names(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + '_>>;
}
