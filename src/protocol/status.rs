//! Status types
//!
//! Snapshot of the files the coordinator is working on.

use super::types::FileId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Status of one registered file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatus {
    pub id: FileId,
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    /// Number of known sources
    pub sources: usize,
    pub outstanding_workers: usize,
    pub completed_blocks: usize,
    pub total_blocks: usize,
    pub created_at: DateTime<Utc>,
}

impl FileStatus {
    /// Check if every block is committed
    pub fn is_complete(&self) -> bool {
        self.completed_blocks == self.total_blocks
    }

    /// Calculate progress percentage (0.0 - 100.0)
    pub fn percentage(&self) -> f64 {
        if self.total_blocks == 0 {
            return 100.0;
        }
        (self.completed_blocks as f64 / self.total_blocks as f64) * 100.0
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file {} '{}' ({} bytes): {}/{} blocks, {} source(s), {} worker(s) outstanding",
            self.id,
            self.name,
            self.size,
            self.completed_blocks,
            self.total_blocks,
            self.sources,
            self.outstanding_workers
        )
    }
}

/// Status of the whole coordinator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeechStatus {
    /// Whether shutdown was requested
    pub shutting_down: bool,
    /// Files in the registry, ordered by id
    pub files: Vec<FileStatus>,
}

impl LeechStatus {
    pub fn active_files(&self) -> usize {
        self.files.len()
    }
}

impl fmt::Display for LeechStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Current active files {}", self.active_files())?;
        for file in &self.files {
            write!(f, "\n\t{}", file)?;
        }
        Ok(())
    }
}
