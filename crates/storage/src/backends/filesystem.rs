//! Local filesystem artifact store.
//!
//! One artifact is one regular file named by its id in a flat directory.
//! Ids cannot contain separators or dots outside the suffix, so every
//! resolved path is a direct child of the root.

use crate::error::{StorageError, StorageResult};
use crate::locks::LockTable;
use crate::traits::{
    ArtifactEntry, ArtifactHandle, ArtifactMeta, ArtifactStream, ByteStream, ContentStore,
    DeleteOutcome, PutOutcome,
};
use async_trait::async_trait;
use futures::StreamExt;
use spool_core::ArtifactId;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Marker inside temp file names: `.<id>.tmp.<uuid>`.
const TEMP_MARKER: &str = ".tmp.";

/// Local filesystem artifact store.
pub struct FilesystemStore {
    root: PathBuf,
    locks: LockTable,
}

impl FilesystemStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Temp files left behind by an interrupted publish are removed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let store = Self {
            root,
            locks: LockTable::new(),
        };

        let removed = store.remove_stale_temp_files().await?;
        if removed > 0 {
            info!(removed, root = %store.root.display(), "Removed stale temp files");
        }

        Ok(store)
    }

    fn artifact_path(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn temp_path(&self, id: &ArtifactId) -> PathBuf {
        self.root
            .join(format!(".{id}{TEMP_MARKER}{}", Uuid::new_v4()))
    }

    /// Metadata of the published file, or `None` when nothing is published.
    ///
    /// Symlinks and directories under an artifact name are never served.
    async fn published_meta(&self, path: &Path) -> StorageResult<Option<ArtifactMeta>> {
        match fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(artifact_meta(&meta)?)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn remove_stale_temp_files(&self) -> StorageResult<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !is_temp_name(name) || !entry.file_type().await?.is_file() {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = %name, error = %e, "Failed to remove stale temp file"),
            }
        }
        Ok(removed)
    }

    /// Stream `data` into a fresh temp file and fsync it.
    async fn write_temp(&self, temp: &TempFile, data: ByteStream) -> StorageResult<u64> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp.path)
            .await?;

        let mut data = data;
        let mut written: u64 = 0;
        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        // Ensure data is on disk before it becomes visible under the final name
        file.sync_all().await?;
        Ok(written)
    }
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(TEMP_MARKER)
}

fn artifact_meta(meta: &std::fs::Metadata) -> StorageResult<ArtifactMeta> {
    Ok(ArtifactMeta {
        size: meta.len(),
        created_at: OffsetDateTime::from(meta.modified()?),
    })
}

/// Build an inventory entry, or `None` for non-regular files and entries
/// deleted since the directory was read.
async fn inventory_entry(
    entry: &fs::DirEntry,
    id: ArtifactId,
) -> StorageResult<Option<ArtifactEntry>> {
    // DirEntry::file_type does not follow symlinks. Some filesystems need a
    // stat here, which races with deletes.
    let file_type = match entry.file_type().await {
        Ok(file_type) => file_type,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::Io(e)),
    };
    if !file_type.is_file() {
        return Ok(None);
    }

    let meta = match entry.metadata().await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::Io(e)),
    };
    let meta = artifact_meta(&meta)?;

    Ok(Some(ArtifactEntry {
        id,
        size: meta.size,
        created_at: meta.created_at,
    }))
}

fn not_found(id: &ArtifactId) -> StorageError {
    StorageError::NotFound(id.to_string())
}

/// Temp file path removed on drop unless it has already been cleaned up.
///
/// Covers errors and cancelled publishes alike.
struct TempFile {
    path: PathBuf,
}

impl Drop for TempFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove temp file"),
        }
    }
}

#[async_trait]
impl ContentStore for FilesystemStore {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, id: &ArtifactId) -> bool {
        match self.published_meta(&self.artifact_path(id)).await {
            Ok(meta) => meta.is_some(),
            Err(e) => {
                warn!(error = %e, "Existence check failed, treating as absent");
                false
            }
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn open(&self, id: &ArtifactId) -> StorageResult<ArtifactHandle> {
        let path = self.artifact_path(id);
        if self.published_meta(&path).await?.is_none() {
            return Err(not_found(id));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                not_found(id)
            } else {
                StorageError::Io(e)
            }
        })?;

        // Size and time come from the opened file, not the name
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(not_found(id));
        }

        Ok(ArtifactHandle::new(id.clone(), artifact_meta(&meta)?, file))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn stat(&self, id: &ArtifactId) -> StorageResult<ArtifactMeta> {
        self.published_meta(&self.artifact_path(id))
            .await?
            .ok_or_else(|| not_found(id))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem"))]
    async fn put(&self, id: &ArtifactId, data: ByteStream) -> StorageResult<PutOutcome> {
        let _guard = self.locks.lock(id.as_str()).await;
        let path = self.artifact_path(id);

        if let Some(meta) = self.published_meta(&path).await? {
            info!("Artifact already published, ignoring duplicate write");
            return Ok(PutOutcome::AlreadyExists(meta));
        }

        // Write to a uniquely named temp file, fsync, then hard-link into place.
        // The link fails instead of replacing an existing file.
        let temp = TempFile {
            path: self.temp_path(id),
        };
        let written = self.write_temp(&temp, data).await?;

        match fs::hard_link(&temp.path, &path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let meta = self.published_meta(&path).await?.ok_or_else(|| {
                    StorageError::Io(std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        format!("{id} is occupied by a non-regular file"),
                    ))
                })?;
                info!("Artifact appeared during write, keeping existing file");
                return Ok(PutOutcome::AlreadyExists(meta));
            }
            Err(e) => return Err(StorageError::Io(e)),
        }

        let meta = self.published_meta(&path).await?.ok_or_else(|| not_found(id))?;
        debug!(size = written, "Artifact published");
        Ok(PutOutcome::Created(meta))
    }

    fn list(&self) -> ArtifactStream {
        let root = self.root.clone();

        // Only a failure to walk the directory itself is yielded as an error.
        // A single unreadable entry is logged and skipped.
        let stream = async_stream::try_stream! {
            let mut entries = fs::read_dir(&root).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let Some(id) = name.to_str().and_then(|n| ArtifactId::parse(n).ok()) else {
                    continue;
                };

                match inventory_entry(&entry, id).await {
                    Ok(Some(item)) => {
                        yield item;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    }
                }
            }
        };

        Box::pin(stream)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, id: &ArtifactId) -> StorageResult<DeleteOutcome> {
        let _guard = self.locks.lock(id.as_str()).await;
        let path = self.artifact_path(id);

        if self.published_meta(&path).await?.is_none() {
            debug!("Artifact already absent");
            return Ok(DeleteOutcome::AlreadyAbsent);
        }

        match fs::remove_file(&path).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Artifact already absent");
                Ok(DeleteOutcome::AlreadyAbsent)
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        // Verify the root directory exists and is accessible
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {}", e),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
