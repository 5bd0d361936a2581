//! File contents stored as one file per id inside the storage directory.

use std::{
    io::{self, SeekFrom},
    path::PathBuf,
};

use async_trait::async_trait;
use shared::types::FileId;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

use crate::store::{BlobError, BlobStore};

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens the blob directory, creating it if it doesn't exist.
    pub async fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn blob_path(&self, file_id: FileId) -> PathBuf {
        self.root.join(format!("{file_id}.bin"))
    }
}

fn not_found_as_blob_error(e: io::Error) -> BlobError {
    match e.kind() {
        io::ErrorKind::NotFound => BlobError::NotFound,
        _ => BlobError::Io(e),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn allocate(&self, file_id: FileId) -> Result<(), BlobError> {
        File::create(self.blob_path(file_id)).await?;
        Ok(())
    }

    async fn read_at(&self, file_id: FileId, offset: u64, max_bytes: usize) -> Result<Vec<u8>, BlobError> {
        let mut file = File::open(self.blob_path(file_id))
            .await
            .map_err(not_found_as_blob_error)?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = Vec::with_capacity(max_bytes);
        (&mut file).take(max_bytes as u64).read_to_end(&mut buf).await?;

        Ok(buf)
    }

    async fn write_at(&self, file_id: FileId, offset: u64, data: &[u8]) -> Result<(), BlobError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(self.blob_path(file_id))
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(())
    }

    async fn size_of(&self, file_id: FileId) -> Result<u64, BlobError> {
        let metadata = fs::metadata(self.blob_path(file_id))
            .await
            .map_err(not_found_as_blob_error)?;

        Ok(metadata.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocate_creates_empty_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).await.unwrap();

        store.allocate(1).await.unwrap();
        assert_eq!(store.size_of(1).await.unwrap(), 0);
        assert!(store.blob_path(1).ends_with("1.bin"));
    }

    #[tokio::test]
    async fn allocate_truncates_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).await.unwrap();

        store.write_at(3, 0, b"old contents").await.unwrap();
        store.allocate(3).await.unwrap();
        assert_eq!(store.size_of(3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sequential_writes_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).await.unwrap();

        store.allocate(7).await.unwrap();
        store.write_at(7, 0, b"hello ").await.unwrap();
        store.write_at(7, 6, b"world").await.unwrap();

        assert_eq!(store.size_of(7).await.unwrap(), 11);
        assert_eq!(store.read_at(7, 0, 5).await.unwrap(), b"hello");
        assert_eq!(store.read_at(7, 6, 100).await.unwrap(), b"world");
        assert!(store.read_at(7, 11, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("nested")).await.unwrap();

        assert!(matches!(store.size_of(42).await, Err(BlobError::NotFound)));
        assert!(matches!(store.read_at(42, 0, 1).await, Err(BlobError::NotFound)));
    }
}
