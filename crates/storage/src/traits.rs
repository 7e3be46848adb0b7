//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use spool_core::ArtifactId;
use std::pin::Pin;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Chunk size for streaming reads (64 KiB).
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum range size for buffered `read_range` calls (128 MiB).
/// Larger intervals must go through `into_range_stream`.
pub const MAX_BUFFERED_RANGE: u64 = 128 * 1024 * 1024;

/// A boxed stream of bytes for streaming reads and writes.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// A boxed stream of inventory entries.
pub type ArtifactStream = Pin<Box<dyn Stream<Item = StorageResult<ArtifactEntry>> + Send>>;

/// Metadata about a stored artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArtifactMeta {
    /// Size in bytes, read from the file.
    pub size: u64,
    /// Publish time. Sole basis for expiry.
    pub created_at: OffsetDateTime,
}

/// One inventory entry yielded by [`ContentStore::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub id: ArtifactId,
    pub size: u64,
    pub created_at: OffsetDateTime,
}

impl ArtifactEntry {
    /// Whether the entry is past its retention window at `now`.
    pub fn is_expired(&self, now: OffsetDateTime, retention: time::Duration) -> bool {
        match self.created_at.checked_add(retention) {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

/// Result of publishing an artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The artifact was written by this call.
    Created(ArtifactMeta),
    /// An artifact with this id was already published; nothing was written.
    AlreadyExists(ArtifactMeta),
}

impl PutOutcome {
    pub fn meta(&self) -> &ArtifactMeta {
        match self {
            Self::Created(meta) | Self::AlreadyExists(meta) => meta,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Result of deleting an artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

/// Reader over an opened artifact.
pub trait ArtifactReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> ArtifactReader for T {}

/// An opened artifact.
///
/// Size and creation time come from the opened file, so a concurrent delete
/// cannot change what this handle reads.
pub struct ArtifactHandle {
    id: ArtifactId,
    meta: ArtifactMeta,
    reader: Box<dyn ArtifactReader>,
}

impl ArtifactHandle {
    pub fn new(id: ArtifactId, meta: ArtifactMeta, reader: impl ArtifactReader + 'static) -> Self {
        Self {
            id,
            meta,
            reader: Box::new(reader),
        }
    }

    pub fn meta(&self) -> &ArtifactMeta {
        &self.meta
    }

    pub fn size(&self) -> u64 {
        self.meta.size
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.meta.created_at
    }

    fn check_bounds(&self, start: u64, end: u64) -> StorageResult<u64> {
        if start > end || end >= self.meta.size {
            return Err(StorageError::OutOfRange(format!(
                "{start}-{end} outside {} bytes of {}",
                self.meta.size, self.id
            )));
        }
        Ok(end - start + 1)
    }

    /// Read the inclusive interval `start..=end` into memory.
    pub async fn read_range(&mut self, start: u64, end: u64) -> StorageResult<Bytes> {
        let len = self.check_bounds(start, end)?;
        if len > MAX_BUFFERED_RANGE {
            return Err(StorageError::OutOfRange(format!(
                "range size {len} exceeds maximum {MAX_BUFFERED_RANGE} bytes"
            )));
        }

        let len = usize::try_from(len).map_err(|_| {
            StorageError::OutOfRange(format!("range size {len} exceeds platform address space"))
        })?;

        self.reader.seek(std::io::SeekFrom::Start(start)).await?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Stream the inclusive interval `start..=end` in [`STREAM_CHUNK_SIZE`] chunks.
    ///
    /// The stream owns the handle; dropping it closes the file.
    pub async fn into_range_stream(mut self, start: u64, end: u64) -> StorageResult<ByteStream> {
        let len = self.check_bounds(start, end)?;
        self.reader.seek(std::io::SeekFrom::Start(start)).await?;

        let limited = self.reader.take(len);
        let stream = ReaderStream::with_capacity(limited, STREAM_CHUNK_SIZE)
            .map(|chunk| chunk.map_err(StorageError::from));
        Ok(Box::pin(stream))
    }
}

impl std::fmt::Debug for ArtifactHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactHandle")
            .field("id", &self.id)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Keyed store of immutable artifacts.
///
/// Ids are validated by construction ([`ArtifactId::parse`]); callers map a
/// parse failure to "not found".
#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    /// Check whether an artifact is published. I/O problems read as absent.
    async fn exists(&self, id: &ArtifactId) -> bool;

    /// Open an artifact for reading.
    async fn open(&self, id: &ArtifactId) -> StorageResult<ArtifactHandle>;

    /// Get an artifact's metadata without opening it.
    async fn stat(&self, id: &ArtifactId) -> StorageResult<ArtifactMeta>;

    /// Publish an artifact from a byte stream.
    ///
    /// Publishing is atomic and never overwrites: if the id already exists the
    /// stream is not consumed and [`PutOutcome::AlreadyExists`] is returned.
    /// A stream error aborts the write and leaves nothing behind.
    async fn put(&self, id: &ArtifactId, data: ByteStream) -> StorageResult<PutOutcome>;

    /// Publish an artifact from an in-memory buffer.
    async fn put_bytes(&self, id: &ArtifactId, data: Bytes) -> StorageResult<PutOutcome> {
        let stream = futures::stream::once(async move { Ok::<_, StorageError>(data) });
        self.put(id, Box::pin(stream)).await
    }

    /// Enumerate published artifacts.
    ///
    /// Each call starts a fresh walk. Entries may vanish between being listed
    /// and being acted on. An `Err` item reports a problem with the walk;
    /// callers keep consuming, and the stream ends when the walk cannot go on.
    fn list(&self) -> ArtifactStream;

    /// Delete an artifact. Deleting an absent artifact is not an error.
    async fn delete(&self, id: &ArtifactId) -> StorageResult<DeleteOutcome>;

    /// Get the name of this storage backend, for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable and properly configured.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Wrap a byte stream so it fails with [`StorageError::TooLarge`] once more
/// than `limit` bytes have passed through.
pub fn limit_stream(stream: ByteStream, limit: u64) -> ByteStream {
    let limited = async_stream::try_stream! {
        let mut stream = stream;
        let mut seen: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            seen = seen.saturating_add(chunk.len() as u64);
            if seen > limit {
                Err::<(), _>(StorageError::TooLarge { limit })?;
            }
            yield chunk;
        }
    };
    Box::pin(limited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn handle(data: impl Into<Vec<u8>>) -> ArtifactHandle {
        let data = data.into();
        ArtifactHandle::new(
            ArtifactId::parse("clip.mp3").unwrap(),
            ArtifactMeta {
                size: data.len() as u64,
                created_at: OffsetDateTime::UNIX_EPOCH,
            },
            Cursor::new(data),
        )
    }

    async fn collect(stream: ByteStream) -> StorageResult<Vec<u8>> {
        let mut stream = stream;
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_read_range_inclusive() {
        let mut h = handle(*b"0123456789");
        assert_eq!(&h.read_range(2, 4).await.unwrap()[..], b"234");
        assert_eq!(&h.read_range(0, 9).await.unwrap()[..], b"0123456789");
        assert_eq!(&h.read_range(9, 9).await.unwrap()[..], b"9");
    }

    #[tokio::test]
    async fn test_read_range_out_of_bounds() {
        let mut h = handle(*b"0123456789");
        assert!(matches!(
            h.read_range(0, 10).await,
            Err(StorageError::OutOfRange(_))
        ));
        assert!(matches!(
            h.read_range(5, 4).await,
            Err(StorageError::OutOfRange(_))
        ));
    }

    #[tokio::test]
    async fn test_range_stream_spans_chunks() {
        let h = handle(vec![7u8; STREAM_CHUNK_SIZE * 2 + 10]);
        let start = 5u64;
        let end = (STREAM_CHUNK_SIZE * 2) as u64;
        let body = collect(h.into_range_stream(start, end).await.unwrap())
            .await
            .unwrap();
        assert_eq!(body.len() as u64, end - start + 1);
    }

    #[tokio::test]
    async fn test_range_stream_rejects_bad_bounds() {
        assert!(handle(*b"abc").into_range_stream(1, 3).await.is_err());
        assert!(handle(Vec::new()).into_range_stream(0, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_limit_stream() {
        fn chunks() -> ByteStream {
            let chunks: Vec<StorageResult<Bytes>> = vec![
                Ok(Bytes::from_static(b"abcd")),
                Ok(Bytes::from_static(b"efgh")),
            ];
            Box::pin(futures::stream::iter(chunks))
        }

        let ok = limit_stream(chunks(), 8);
        assert_eq!(collect(ok).await.unwrap(), b"abcdefgh");

        let over = limit_stream(chunks(), 7);
        assert!(matches!(
            collect(over).await,
            Err(StorageError::TooLarge { limit: 7 })
        ));
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let created_at = OffsetDateTime::UNIX_EPOCH + time::Duration::hours(10);
        let entry = ArtifactEntry {
            id: ArtifactId::parse("a.mp3").unwrap(),
            size: 1,
            created_at,
        };
        let retention = time::Duration::hours(2);
        let expires_at = created_at + retention;
        assert!(!entry.is_expired(expires_at - time::Duration::seconds(1), retention));
        assert!(entry.is_expired(expires_at, retention));
        assert!(entry.is_expired(expires_at + time::Duration::seconds(1), retention));
    }
}
