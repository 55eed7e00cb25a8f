//! Local filesystem storage backend.
//!
//! Files are stored flat under a configurable upload directory, named by
//! their stored name.  Incoming streams are written to `.tmp/` first and
//! renamed into place only once complete, so a rejected, interrupted or
//! cancelled upload never leaves a partial file in the upload directory.

use futures::StreamExt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::backend::{ByteStream, StorageBackend, StoredContent, WriteError};
use crate::validation::is_safe_stored_name;

const TEMP_DIR: &str = ".tmp";

/// Stores uploaded files on the local filesystem.
pub struct LocalBackend {
    /// Directory holding the stored files.
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new `LocalBackend` rooted at `root`.
    ///
    /// The directory is created if it does not exist. Leftover temp files
    /// from a previous run are removed.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let tmp = root.join(TEMP_DIR);
        std::fs::create_dir_all(&tmp)?;

        let mut purged = 0usize;
        for entry in std::fs::read_dir(&tmp)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())?;
                purged += 1;
            }
        }
        if purged > 0 {
            warn!("Removed {} stale partial upload(s) from {}", purged, tmp.display());
        }

        Ok(Self { root })
    }

    /// Resolve a stored name to a file path inside the root directory.
    ///
    /// Rejects anything that could escape the root or address the temp
    /// area.
    fn resolve(&self, name: &str) -> anyhow::Result<PathBuf> {
        if !is_safe_stored_name(name) {
            anyhow::bail!("Unsafe stored name: {:?}", name);
        }
        Ok(self.root.join(name))
    }

    /// Generate a temp file path under .tmp/ for staged writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(TEMP_DIR).join(format!("tmp-{}", id))
    }
}

/// Removes a staged temp file when dropped, unless disarmed after the
/// rename succeeded. Covers the handler future being dropped mid-upload.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial upload {}: {}", self.path.display(), e);
                }
            } else {
                debug!("Discarded partial upload {}", self.path.display());
            }
        }
    }
}

impl StorageBackend for LocalBackend {
    fn write_stream<'a>(
        &'a self,
        name: &'a str,
        mut body: ByteStream<'a>,
        limit: u64,
    ) -> Pin<Box<dyn Future<Output = Result<u64, WriteError>> + Send + 'a>> {
        Box::pin(async move {
            let final_path = self.resolve(name)?;
            if final_path.exists() {
                return Err(anyhow::anyhow!("Stored name already in use: {}", name).into());
            }

            let tmp_path = self.temp_path();
            let guard = TempFileGuard::new(tmp_path.clone());
            let mut file = tokio::fs::File::create(&tmp_path)
                .await
                .map_err(anyhow::Error::from)?;

            let mut written: u64 = 0;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(WriteError::Interrupted)?;
                written += chunk.len() as u64;
                if written > limit {
                    return Err(WriteError::TooLarge { limit });
                }
                file.write_all(&chunk).await.map_err(anyhow::Error::from)?;
            }

            file.sync_all().await.map_err(anyhow::Error::from)?;
            drop(file);

            tokio::fs::rename(&tmp_path, &final_path)
                .await
                .map_err(anyhow::Error::from)?;
            guard.disarm();

            Ok(written)
        })
    }

    fn get(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredContent>>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let path = self.resolve(&name)?;
            let file = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let meta = file.metadata().await?;
            if !meta.is_file() {
                return Ok(None);
            }
            Ok(Some(StoredContent {
                size: meta.len(),
                body: ReaderStream::new(file).boxed(),
            }))
        })
    }

    fn delete(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let path = self.resolve(&name)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn list_names(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + '_>> {
        Box::pin(async move {
            let mut names = Vec::new();
            let mut entries = tokio::fs::read_dir(&self.root).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_file() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    if !name.starts_with('.') {
                        names.push(name.to_string());
                    }
                }
            }
            names.sort();
            Ok(names)
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
