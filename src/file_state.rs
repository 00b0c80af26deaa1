//! Per-file download state
//!
//! One [`FileDownloadState`] exists per file that was ever queued. It is
//! shared by `Arc` among every worker spawned for the file, across load
//! cycles. Sources only grow, the outstanding-worker counter is atomic, and
//! committed blocks are tracked in a bitfield.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bitvec::prelude::*;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{LeechError, ProtocolErrorKind, Result};
use crate::protocol::{BlockIndex, CatalogEntry, FileId, FileStatus, Source};
use crate::storage::BlockStorage;

/// Shared state of one file being loaded
pub struct FileDownloadState {
    id: FileId,
    name: String,
    path: PathBuf,
    size: u64,
    block_size: u64,
    sources: RwLock<BTreeSet<Source>>,
    outstanding_workers: AtomicUsize,
    completed: RwLock<BitVec<u8, Msb0>>,
    completion_claimed: AtomicBool,
    storage: Arc<dyn BlockStorage>,
    created_at: DateTime<Utc>,
}

impl std::fmt::Debug for FileDownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDownloadState")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("size", &self.size)
            .field("outstanding_workers", &self.outstanding_workers())
            .finish_non_exhaustive()
    }
}

impl FileDownloadState {
    /// Create the state for `entry`, stored at `path` in blocks of `block_size` bytes
    pub fn new(
        entry: &CatalogEntry,
        path: impl Into<PathBuf>,
        block_size: u64,
        storage: Arc<dyn BlockStorage>,
    ) -> Self {
        let block_size = block_size.max(1);
        let blocks = entry.size.div_ceil(block_size) as usize;
        Self {
            id: entry.id,
            name: entry.name.clone(),
            path: path.into(),
            size: entry.size,
            block_size,
            sources: RwLock::new(BTreeSet::new()),
            outstanding_workers: AtomicUsize::new(0),
            completed: RwLock::new(bitvec![u8, Msb0; 0; blocks]),
            completion_claimed: AtomicBool::new(false),
            storage,
            created_at: Utc::now(),
        }
    }

    /// Path a catalog entry is loaded to inside `load_dir`.
    ///
    /// Only the final path component of the advertised name is kept so a
    /// tracker cannot direct writes outside `load_dir`.
    pub fn path_for(load_dir: &Path, entry: &CatalogEntry) -> PathBuf {
        let name = Path::new(&entry.name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty() && *n != "." && *n != "..")
            .map(str::to_string)
            .unwrap_or_else(|| format!("file-{}", entry.id));
        load_dir.join(name)
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of blocks in the file
    pub fn block_count(&self) -> usize {
        self.completed.read().len()
    }

    /// Byte offset and length of block `index`, `None` past the end
    pub fn block_span(&self, index: BlockIndex) -> Option<(u64, usize)> {
        let offset = index as u64 * self.block_size;
        if offset >= self.size {
            return None;
        }
        let len = (self.size - offset).min(self.block_size) as usize;
        Some((offset, len))
    }

    /// Merge sources into the set, returning how many were new
    pub fn merge_sources(&self, sources: impl IntoIterator<Item = Source>) -> usize {
        let mut known = self.sources.write();
        sources
            .into_iter()
            .filter(|source| known.insert(*source))
            .count()
    }

    /// Snapshot of the known sources, in order
    pub fn sources(&self) -> Vec<Source> {
        self.sources.read().iter().copied().collect()
    }

    pub fn source_count(&self) -> usize {
        self.sources.read().len()
    }

    pub fn has_source(&self, source: &Source) -> bool {
        self.sources.read().contains(source)
    }

    pub fn outstanding_workers(&self) -> usize {
        self.outstanding_workers.load(Ordering::SeqCst)
    }

    /// Account for a new worker. The returned guard releases the slot
    /// exactly once, when finished or dropped.
    pub fn begin_worker(self: &Arc<Self>) -> WorkerGuard {
        self.outstanding_workers.fetch_add(1, Ordering::SeqCst);
        WorkerGuard {
            file: Arc::clone(self),
            released: false,
        }
    }

    pub fn has_block(&self, index: BlockIndex) -> bool {
        self.completed
            .read()
            .get(index as usize)
            .map(|bit| *bit)
            .unwrap_or(false)
    }

    pub fn completed_blocks(&self) -> usize {
        self.completed.read().count_ones()
    }

    pub fn is_complete(&self) -> bool {
        self.completed.read().all()
    }

    /// Blocks of `blocks` not committed yet, in the given order
    pub fn missing_blocks(&self, blocks: &[BlockIndex]) -> Vec<BlockIndex> {
        blocks
            .iter()
            .copied()
            .filter(|index| !self.has_block(*index))
            .collect()
    }

    /// True exactly once, for the first caller after every block is committed
    pub fn claim_completion(&self) -> bool {
        self.is_complete() && !self.completion_claimed.swap(true, Ordering::SeqCst)
    }

    /// Validate and write one block, then mark it committed
    pub async fn commit_block(&self, index: BlockIndex, data: &[u8]) -> Result<()> {
        let (offset, len) = self.block_span(index).ok_or_else(|| {
            LeechError::protocol(
                ProtocolErrorKind::InvalidBlock,
                format!("block {} is past the end of file {}", index, self.id),
            )
        })?;
        if data.len() != len {
            return Err(LeechError::protocol(
                ProtocolErrorKind::InvalidBlock,
                format!(
                    "block {} of file {} has wrong size: expected {}, got {}",
                    index,
                    self.id,
                    len,
                    data.len()
                ),
            ));
        }

        self.storage.write_block(offset, data).await?;
        self.completed.write().set(index as usize, true);
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.storage.flush().await
    }

    pub fn status(&self) -> FileStatus {
        FileStatus {
            id: self.id,
            name: self.name.clone(),
            path: self.path.clone(),
            size: self.size,
            sources: self.source_count(),
            outstanding_workers: self.outstanding_workers(),
            completed_blocks: self.completed_blocks(),
            total_blocks: self.block_count(),
            created_at: self.created_at,
        }
    }
}

/// Outstanding-worker slot held by one worker
#[must_use = "dropping the guard releases the worker slot immediately"]
pub struct WorkerGuard {
    file: Arc<FileDownloadState>,
    released: bool,
}

impl WorkerGuard {
    pub fn file(&self) -> &Arc<FileDownloadState> {
        &self.file
    }

    /// Release the slot, returning how many workers remain outstanding
    pub fn finish(mut self) -> usize {
        self.released = true;
        self.file.outstanding_workers.fetch_sub(1, Ordering::SeqCst) - 1
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if !self.released {
            self.file.outstanding_workers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
