//! Artifact storage abstraction and backends for Spool.
//!
//! This crate provides:
//! - The `ContentStore` trait: keyed, immutable, self-expiring artifacts
//! - Atomic publish with per-id locking (duplicate writes are no-ops)
//! - Open handles that serve byte ranges and survive concurrent deletes
//! - Backend: local filesystem

pub mod backends;
pub mod error;
pub mod locks;
pub mod traits;

pub use backends::filesystem::FilesystemStore;
pub use error::{StorageError, StorageResult};
pub use traits::{
    ArtifactEntry, ArtifactHandle, ArtifactMeta, ArtifactReader, ArtifactStream, ByteStream,
    ContentStore, DeleteOutcome, PutOutcome, STREAM_CHUNK_SIZE, limit_stream,
};

use spool_core::config::StorageConfig;
use std::sync::Arc;

/// Create a content store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ContentStore>> {
    config.validate().map_err(StorageError::Config)?;
    let store = FilesystemStore::new(&config.path).await?;
    Ok(Arc::new(store))
}
