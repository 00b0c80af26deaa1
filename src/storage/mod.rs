//! Storage Module
//!
//! Block sinks that downloaded data is committed to. Each file gets its own
//! [`BlockStorage`], opened through a [`StorageProvider`]. Writes for
//! different blocks never overlap.

pub mod file;

pub use file::{FileStorage, FileStorageProvider};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::{LeechError, Result, StorageErrorKind};

/// Block-addressable sink for one file
#[async_trait]
pub trait BlockStorage: Send + Sync {
    /// Write `data` at byte `offset`
    async fn write_block(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Flush buffered data to the backing medium
    async fn flush(&self) -> Result<()>;
}

/// Opens the storage for a newly loaded file
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn open(&self, path: &Path, size: u64) -> Result<Arc<dyn BlockStorage>>;
}

/// In-memory storage for testing
#[derive(Debug)]
pub struct MemoryStorage {
    path: PathBuf,
    data: Mutex<Vec<u8>>,
}

impl MemoryStorage {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            data: Mutex::new(vec![0; size as usize]),
        }
    }

    /// Copy of the current contents
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

#[async_trait]
impl BlockStorage for MemoryStorage {
    async fn write_block(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut buf = self.data.lock();
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= buf.len() as u64)
            .ok_or_else(|| {
                LeechError::storage(
                    StorageErrorKind::OutOfBounds,
                    &self.path,
                    format!(
                        "write of {} bytes at {} exceeds size {}",
                        data.len(),
                        offset,
                        buf.len()
                    ),
                )
            })?;
        buf[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Provider handing out [`MemoryStorage`] and keeping them for inspection
#[derive(Debug, Default)]
pub struct MemoryStorageProvider {
    opened: RwLock<HashMap<PathBuf, Arc<MemoryStorage>>>,
}

impl MemoryStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage previously opened for `path`
    pub fn get(&self, path: &Path) -> Option<Arc<MemoryStorage>> {
        self.opened.read().get(path).cloned()
    }

    /// Number of storages opened so far
    pub fn opened_count(&self) -> usize {
        self.opened.read().len()
    }
}

#[async_trait]
impl StorageProvider for MemoryStorageProvider {
    async fn open(&self, path: &Path, size: u64) -> Result<Arc<dyn BlockStorage>> {
        let storage = Arc::new(MemoryStorage::new(path, size));
        self.opened
            .write()
            .insert(path.to_path_buf(), Arc::clone(&storage));
        Ok(storage)
    }
}
