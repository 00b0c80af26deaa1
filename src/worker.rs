//! Block fetch worker
//!
//! A worker fetches its assigned blocks from one source, one after the
//! other, and commits each into the file's storage. It stops at the first
//! failure or when its cancellation token fires. The worker's slot in the
//! file's outstanding counter is held by a [`WorkerGuard`], so it is released
//! whatever way the worker ends.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::file_state::{FileDownloadState, WorkerGuard};
use crate::peer::PeerClient;
use crate::protocol::{BlockIndex, LeechEvent, Source};

/// How a worker ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// Blocks fetched and committed by this worker
    pub fetched: usize,
    /// Blocks already committed by someone else when their turn came
    pub skipped: usize,
    pub interrupted: bool,
    pub failed: bool,
}

/// Fetches a fixed list of blocks of one file from one source
pub struct BlockFetchWorker {
    source: Source,
    blocks: Vec<BlockIndex>,
    file: Arc<FileDownloadState>,
    peers: PeerClient,
    event_tx: broadcast::Sender<LeechEvent>,
    cancel: CancellationToken,
}

impl BlockFetchWorker {
    pub fn new(
        source: Source,
        blocks: Vec<BlockIndex>,
        file: Arc<FileDownloadState>,
        peers: PeerClient,
        event_tx: broadcast::Sender<LeechEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            blocks,
            file,
            peers,
            event_tx,
            cancel,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn blocks(&self) -> &[BlockIndex] {
        &self.blocks
    }

    /// Take a slot in the file's outstanding counter and run on a new task
    pub fn spawn(self) -> JoinHandle<WorkerOutcome> {
        let guard = self.file.begin_worker();
        tokio::spawn(self.run(guard))
    }

    /// Fetch every assigned block, releasing `guard` when done
    pub async fn run(self, guard: WorkerGuard) -> WorkerOutcome {
        let file_id = self.file.id();
        let mut outcome = WorkerOutcome::default();

        tracing::debug!(
            "Worker for file {} from {} starting with {} block(s)",
            file_id,
            self.source,
            self.blocks.len()
        );

        for &index in &self.blocks {
            if self.cancel.is_cancelled() {
                outcome.interrupted = true;
                break;
            }
            if self.file.has_block(index) {
                outcome.skipped += 1;
                continue;
            }

            let result = tokio::select! {
                result = self.fetch_block(index) => result,
                _ = self.cancel.cancelled() => {
                    outcome.interrupted = true;
                    break;
                }
            };

            match result {
                Ok(()) => {
                    outcome.fetched += 1;
                    let _ = self.event_tx.send(LeechEvent::BlockFetched {
                        file_id,
                        source: self.source,
                        index,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "Worker for file {} from {} stopped at block {}: {}",
                        file_id,
                        self.source,
                        index,
                        e
                    );
                    outcome.failed = true;
                    break;
                }
            }
        }

        if outcome.interrupted {
            tracing::debug!(
                "Worker for file {} from {} interrupted after {} block(s)",
                file_id,
                self.source,
                outcome.fetched
            );
        }

        let _ = self.event_tx.send(LeechEvent::WorkerFinished {
            file_id,
            source: self.source,
            fetched: outcome.fetched,
            interrupted: outcome.interrupted,
        });

        let remaining = guard.finish();
        if remaining == 0 && self.file.claim_completion() {
            if let Err(e) = self.file.flush().await {
                tracing::warn!("Failed to flush file {}: {}", file_id, e);
            }
            tracing::info!("File {} '{}' completed", file_id, self.file.name());
            let _ = self.event_tx.send(LeechEvent::FileCompleted { file_id });
        }

        outcome
    }

    async fn fetch_block(&self, index: BlockIndex) -> Result<()> {
        let data = self
            .peers
            .fetch_block(self.source, self.file.id(), index)
            .await?;
        self.file.commit_block(index, &data).await
    }
}
