//! File-backed block storage
//!
//! The target file is created (or reopened) with its final length up front
//! and every block is written at its own offset.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{BlockStorage, StorageProvider};
use crate::error::{LeechError, Result, StorageErrorKind};

/// Block storage writing into a file on disk
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    size: u64,
    file: Mutex<File>,
}

impl FileStorage {
    /// Open `path` for writing, creating parent directories and setting the
    /// file length to `size`.
    pub async fn open(path: impl Into<PathBuf>, size: u64) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                LeechError::storage(
                    StorageErrorKind::Io,
                    parent,
                    format!("Create dir failed: {}", e),
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .await
            .map_err(|e| {
                LeechError::storage(StorageErrorKind::Io, &path, format!("Open failed: {}", e))
            })?;

        file.set_len(size).await.map_err(|e| {
            LeechError::storage(
                StorageErrorKind::Io,
                &path,
                format!("Allocate failed: {}", e),
            )
        })?;

        Ok(Self {
            path,
            size,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BlockStorage for FileStorage {
    async fn write_block(&self, offset: u64, data: &[u8]) -> Result<()> {
        if offset.saturating_add(data.len() as u64) > self.size {
            return Err(LeechError::storage(
                StorageErrorKind::OutOfBounds,
                &self.path,
                format!(
                    "write of {} bytes at {} exceeds size {}",
                    data.len(),
                    offset,
                    self.size
                ),
            ));
        }

        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await.map_err(|e| {
            LeechError::storage(StorageErrorKind::Io, &self.path, format!("Seek failed: {}", e))
        })?;
        file.write_all(data).await.map_err(|e| {
            LeechError::storage(StorageErrorKind::Io, &self.path, format!("Write failed: {}", e))
        })?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut file = self.file.lock().await;
        file.flush().await.map_err(|e| {
            LeechError::storage(StorageErrorKind::Io, &self.path, format!("Flush failed: {}", e))
        })?;
        file.sync_all().await.map_err(|e| {
            LeechError::storage(StorageErrorKind::Io, &self.path, format!("Sync failed: {}", e))
        })?;
        Ok(())
    }
}

/// Provider opening a [`FileStorage`] per file
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStorageProvider;

#[async_trait]
impl StorageProvider for FileStorageProvider {
    async fn open(&self, path: &Path, size: u64) -> Result<Arc<dyn BlockStorage>> {
        Ok(Arc::new(FileStorage::open(path, size).await?))
    }
}
