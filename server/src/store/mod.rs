//! Storage capabilities consumed by sessions: file records with resume checkpoints, and blobs.
//!
//! Both are shared by every running session without additional locking, implementations are
//! responsible for keeping each operation atomic.

#[cfg(test)]
pub mod memory;

use std::{io, sync::Arc};

use async_trait::async_trait;
use shared::types::FileId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub file_id: FileId,
    pub name: String,
    pub size: u64,
    pub checksum: Option<String>,
    pub uploaded_at: String,
    pub download_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeCheckpoint {
    pub resume_token: String,
    pub file_id: FileId,
    /// Bytes already delivered to the client.
    pub offset: u64,
    pub chunk_size: u32,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a file with this name already exists")]
    DuplicateName,

    #[error("value out of range for the database: {0}")]
    OutOfRange(u64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found")]
    NotFound,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Registers a new file and returns its generated id.
    async fn insert_file(&self, name: &str, size: u64, checksum: Option<&str>) -> Result<FileId, StoreError>;

    async fn get_file(&self, file_id: FileId) -> Result<Option<FileRecord>, StoreError>;

    /// Newest uploads first, ties broken by the higher id.
    async fn list_newest_first(&self, limit: u32) -> Result<Vec<FileRecord>, StoreError>;

    async fn update_file_size(&self, file_id: FileId, size: u64) -> Result<(), StoreError>;

    async fn increment_download_count(&self, file_id: FileId) -> Result<(), StoreError>;

    async fn upsert_resume_checkpoint(
        &self,
        token: &str,
        file_id: FileId,
        offset: u64,
        chunk_size: u32,
    ) -> Result<(), StoreError>;

    async fn get_resume_checkpoint(&self, token: &str) -> Result<Option<ResumeCheckpoint>, StoreError>;

    async fn delete_resume_checkpoint(&self, token: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Creates an empty blob, replacing any previous contents.
    async fn allocate(&self, file_id: FileId) -> Result<(), BlobError>;

    /// Reads up to `max_bytes` starting at `offset`, fewer only at the end of the blob.
    async fn read_at(&self, file_id: FileId, offset: u64, max_bytes: usize) -> Result<Vec<u8>, BlobError>;

    async fn write_at(&self, file_id: FileId, offset: u64, data: &[u8]) -> Result<(), BlobError>;

    async fn size_of(&self, file_id: FileId) -> Result<u64, BlobError>;
}

/// Store handles passed into every session.
#[derive(Clone)]
pub struct Stores {
    pub meta: Arc<dyn MetadataStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Stores {
    pub fn new(meta: impl MetadataStore + 'static, blobs: impl BlobStore + 'static) -> Self {
        Self {
            meta: Arc::new(meta),
            blobs: Arc::new(blobs),
        }
    }
}
