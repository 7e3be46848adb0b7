use bytes::Bytes;
use futures::StreamExt;
use spool_core::ArtifactId;
use spool_storage::{ByteStream, FilesystemStore, StorageResult};
use std::time::Duration;
use tempfile::TempDir;

/// Create a store in a fresh temp directory. Keep the `TempDir` alive.
#[allow(dead_code)]
pub async fn test_store() -> (FilesystemStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(dir.path()).await.unwrap();
    (store, dir)
}

/// Parse an id that is known to be valid.
#[allow(dead_code)]
pub fn id(raw: &str) -> ArtifactId {
    ArtifactId::parse(raw).unwrap()
}

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Split `data` into a stream of `chunk_size` pieces.
#[allow(dead_code)]
pub fn chunked_stream(data: Bytes, chunk_size: usize) -> ByteStream {
    let chunks: Vec<StorageResult<Bytes>> = data
        .chunks(chunk_size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// Like `chunked_stream`, but sleeps before every chunk.
#[allow(dead_code)]
pub fn slow_stream(data: Bytes, chunk_size: usize, delay: Duration) -> ByteStream {
    Box::pin(chunked_stream(data, chunk_size).then(move |chunk| async move {
        tokio::time::sleep(delay).await;
        chunk
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(42, 1000);
        assert_eq!(data1, data2);
    }

    #[test]
    fn test_seeded_bytes_different_seeds() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(43, 1000);
        assert_ne!(data1, data2);
    }
}
