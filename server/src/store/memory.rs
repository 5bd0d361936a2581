//! In-memory stores for tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use async_trait::async_trait;
use shared::types::FileId;

use super::{BlobError, BlobStore, FileRecord, MetadataStore, ResumeCheckpoint, StoreError};

const UPLOADED_AT: &str = "2024-01-01 00:00:00";

#[derive(Default)]
pub struct MemoryMetadata {
    inner: Mutex<MetadataInner>,
}

#[derive(Default)]
struct MetadataInner {
    last_id: FileId,
    files: BTreeMap<FileId, FileRecord>,
    resume: HashMap<String, ResumeCheckpoint>,
}

#[async_trait]
impl MetadataStore for MemoryMetadata {
    async fn insert_file(&self, name: &str, size: u64, checksum: Option<&str>) -> Result<FileId, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.files.values().any(|f| f.name == name) {
            return Err(StoreError::DuplicateName);
        }

        inner.last_id += 1;
        let file_id = inner.last_id;
        inner.files.insert(
            file_id,
            FileRecord {
                file_id,
                name: name.to_string(),
                size,
                checksum: checksum.map(str::to_string),
                uploaded_at: UPLOADED_AT.to_string(),
                download_count: 0,
            },
        );

        Ok(file_id)
    }

    async fn get_file(&self, file_id: FileId) -> Result<Option<FileRecord>, StoreError> {
        Ok(self.inner.lock().unwrap().files.get(&file_id).cloned())
    }

    async fn list_newest_first(&self, limit: u32) -> Result<Vec<FileRecord>, StoreError> {
        let mut files: Vec<FileRecord> = self.inner.lock().unwrap().files.values().cloned().collect();
        files.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then(b.file_id.cmp(&a.file_id))
        });
        files.truncate(limit as usize);
        Ok(files)
    }

    async fn update_file_size(&self, file_id: FileId, size: u64) -> Result<(), StoreError> {
        if let Some(file) = self.inner.lock().unwrap().files.get_mut(&file_id) {
            file.size = size;
        }
        Ok(())
    }

    async fn increment_download_count(&self, file_id: FileId) -> Result<(), StoreError> {
        if let Some(file) = self.inner.lock().unwrap().files.get_mut(&file_id) {
            file.download_count += 1;
        }
        Ok(())
    }

    async fn upsert_resume_checkpoint(
        &self,
        token: &str,
        file_id: FileId,
        offset: u64,
        chunk_size: u32,
    ) -> Result<(), StoreError> {
        self.inner.lock().unwrap().resume.insert(
            token.to_string(),
            ResumeCheckpoint {
                resume_token: token.to_string(),
                file_id,
                offset,
                chunk_size,
                timestamp: UPLOADED_AT.to_string(),
            },
        );
        Ok(())
    }

    async fn get_resume_checkpoint(&self, token: &str) -> Result<Option<ResumeCheckpoint>, StoreError> {
        Ok(self.inner.lock().unwrap().resume.get(token).cloned())
    }

    async fn delete_resume_checkpoint(&self, token: &str) -> Result<(), StoreError> {
        self.inner.lock().unwrap().resume.remove(token);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlobs {
    blobs: Mutex<HashMap<FileId, Vec<u8>>>,
}

impl MemoryBlobs {
    pub fn contents(&self, file_id: FileId) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(&file_id).cloned()
    }

    pub fn insert(&self, file_id: FileId, data: Vec<u8>) {
        self.blobs.lock().unwrap().insert(file_id, data);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn allocate(&self, file_id: FileId) -> Result<(), BlobError> {
        self.blobs.lock().unwrap().insert(file_id, Vec::new());
        Ok(())
    }

    async fn read_at(&self, file_id: FileId, offset: u64, max_bytes: usize) -> Result<Vec<u8>, BlobError> {
        let blobs = self.blobs.lock().unwrap();
        let blob = blobs.get(&file_id).ok_or(BlobError::NotFound)?;

        let start = (offset as usize).min(blob.len());
        let end = (start + max_bytes).min(blob.len());
        Ok(blob[start..end].to_vec())
    }

    async fn write_at(&self, file_id: FileId, offset: u64, data: &[u8]) -> Result<(), BlobError> {
        let mut blobs = self.blobs.lock().unwrap();
        let blob = blobs.entry(file_id).or_default();

        let start = offset as usize;
        if blob.len() < start + data.len() {
            blob.resize(start + data.len(), 0);
        }
        blob[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    async fn size_of(&self, file_id: FileId) -> Result<u64, BlobError> {
        let blobs = self.blobs.lock().unwrap();
        let blob = blobs.get(&file_id).ok_or(BlobError::NotFound)?;
        Ok(blob.len() as u64)
    }
}
