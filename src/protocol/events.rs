//! Leech events
//!
//! Events emitted by the coordinator and its workers.

use super::types::{BlockIndex, FileId, Source};
use serde::{Deserialize, Serialize};

/// Events emitted by the leech core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeechEvent {
    /// The coordinator picked a queued id
    LoadStarted { file_id: FileId },
    /// The id is missing from the catalog even after a refresh
    FileUnresolvable { file_id: FileId },
    /// Processing of the id was aborted
    LoadFailed { file_id: FileId, error: String },
    /// Tracker answered with the sources of the file
    SourcesDiscovered {
        file_id: FileId,
        new: usize,
        total: usize,
    },
    /// A source did not report its inventory this round
    SurveyFailed { file_id: FileId, source: Source },
    /// Blocks were partitioned and workers spawned
    RoundAssigned {
        file_id: FileId,
        workers: usize,
        blocks: usize,
    },
    /// One block was committed to storage
    BlockFetched {
        file_id: FileId,
        source: Source,
        index: BlockIndex,
    },
    /// A worker stopped
    WorkerFinished {
        file_id: FileId,
        source: Source,
        fetched: usize,
        interrupted: bool,
    },
    /// Every block of the file is committed and no worker is outstanding
    FileCompleted { file_id: FileId },
}

impl LeechEvent {
    /// File the event refers to
    pub fn file_id(&self) -> FileId {
        match self {
            Self::LoadStarted { file_id }
            | Self::FileUnresolvable { file_id }
            | Self::LoadFailed { file_id, .. }
            | Self::SourcesDiscovered { file_id, .. }
            | Self::SurveyFailed { file_id, .. }
            | Self::RoundAssigned { file_id, .. }
            | Self::BlockFetched { file_id, .. }
            | Self::WorkerFinished { file_id, .. }
            | Self::FileCompleted { file_id } => *file_id,
        }
    }
}
