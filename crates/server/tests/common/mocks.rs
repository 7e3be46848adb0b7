//! Scripted content stores for sweeper failure paths.

use async_trait::async_trait;
use spool_core::ArtifactId;
use spool_storage::{
    ArtifactEntry, ArtifactHandle, ArtifactMeta, ArtifactStream, ByteStream, ContentStore,
    DeleteOutcome, PutOutcome, StorageError, StorageResult,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

/// One step of a scripted listing.
#[allow(dead_code)]
#[derive(Clone)]
pub enum Listed {
    Entry(&'static str),
    /// An entry that vanished while being listed.
    Vanished,
}

/// Store with a fixed inventory and per-id delete behaviour.
///
/// Every listed entry was created at `created_at`. Deletes of ids in
/// `failing` return an I/O error, deletes of ids in `stuck` never finish.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedStore {
    pub listing: Vec<Listed>,
    pub created_at: Option<OffsetDateTime>,
    pub failing: HashSet<&'static str>,
    pub stuck: HashSet<&'static str>,
    pub deleted: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedStore {
    pub fn new(listing: Vec<Listed>, created_at: OffsetDateTime) -> Self {
        Self {
            listing,
            created_at: Some(created_at),
            ..Default::default()
        }
    }

    pub fn failing_on(mut self, id: &'static str) -> Self {
        self.failing.insert(id);
        self
    }

    pub fn stuck_on(mut self, id: &'static str) -> Self {
        self.stuck.insert(id);
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

fn unsupported() -> StorageError {
    StorageError::Io(std::io::Error::other("not supported by scripted store"))
}

#[async_trait]
impl ContentStore for ScriptedStore {
    async fn exists(&self, _id: &ArtifactId) -> bool {
        false
    }

    async fn open(&self, id: &ArtifactId) -> StorageResult<ArtifactHandle> {
        Err(StorageError::NotFound(id.to_string()))
    }

    async fn stat(&self, id: &ArtifactId) -> StorageResult<ArtifactMeta> {
        Err(StorageError::NotFound(id.to_string()))
    }

    async fn put(&self, _id: &ArtifactId, _data: ByteStream) -> StorageResult<PutOutcome> {
        Err(unsupported())
    }

    fn list(&self) -> ArtifactStream {
        let created_at = self.created_at.unwrap_or_else(OffsetDateTime::now_utc);
        let items: Vec<StorageResult<ArtifactEntry>> = self
            .listing
            .iter()
            .map(|step| match step {
                Listed::Entry(name) => Ok(ArtifactEntry {
                    id: ArtifactId::parse(name).unwrap(),
                    size: 1,
                    created_at,
                }),
                Listed::Vanished => Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "entry vanished",
                ))),
            })
            .collect();
        Box::pin(futures::stream::iter(items))
    }

    async fn delete(&self, id: &ArtifactId) -> StorageResult<DeleteOutcome> {
        if self.stuck.contains(id.as_str()) {
            return std::future::pending().await;
        }
        if self.failing.contains(id.as_str()) {
            return Err(StorageError::Io(std::io::Error::other("disk on fire")));
        }
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(DeleteOutcome::Deleted)
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}
