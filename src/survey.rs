//! Block inventory survey
//!
//! Before each assignment round every known source of the file is asked,
//! concurrently, which blocks it holds. Sources that fail or never answer
//! are left out of the round's inventory but stay in the file's source set.

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::assigner::BlockInventory;
use crate::peer::PeerClient;
use crate::protocol::{BlockIndex, FileId, LeechEvent, Source};

/// Asks one source for its inventory of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStatRequester {
    pub source: Source,
    pub file_id: FileId,
}

impl BlockStatRequester {
    pub fn new(source: Source, file_id: FileId) -> Self {
        Self { source, file_id }
    }

    /// Issue the request and wait for the answer.
    ///
    /// Returns `None` when the request failed, got a null response, or was
    /// interrupted through `cancel`.
    pub async fn run(self, peers: &PeerClient, cancel: &CancellationToken) -> Option<Vec<BlockIndex>> {
        let result = tokio::select! {
            result = peers.block_stat(self.source, self.file_id) => result,
            _ = cancel.cancelled() => {
                tracing::debug!("Block stat to {} for file {} interrupted", self.source, self.file_id);
                return None;
            }
        };

        match result {
            Ok(Some(blocks)) => Some(blocks),
            Ok(None) => {
                tracing::warn!("Source {} gave no block stat for file {}", self.source, self.file_id);
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Block stat to {} for file {} failed: {}",
                    self.source,
                    self.file_id,
                    e
                );
                None
            }
        }
    }
}

/// Survey `sources` for `file_id`, one task per source, and wait for all of
/// them. Only sources that answered appear in the returned inventory.
pub async fn survey_sources(
    peers: &PeerClient,
    file_id: FileId,
    sources: &[Source],
    cancel: &CancellationToken,
    event_tx: Option<&broadcast::Sender<LeechEvent>>,
) -> BlockInventory {
    let handles: Vec<_> = sources
        .iter()
        .map(|&source| {
            let requester = BlockStatRequester::new(source, file_id);
            let peers = peers.clone();
            let cancel = cancel.clone();
            let task = tokio::spawn(async move { requester.run(&peers, &cancel).await });
            (source, task)
        })
        .collect();

    let (surveyed, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let results = join_all(tasks).await;

    let mut inventory = BlockInventory::new();
    for (source, result) in surveyed.iter().copied().zip(results) {
        let blocks = match result {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::error!("Block stat task for {} panicked: {:?}", source, e);
                None
            }
        };
        match blocks {
            Some(blocks) => {
                inventory.insert(source, blocks);
            }
            None => {
                if let Some(tx) = event_tx {
                    let _ = tx.send(LeechEvent::SurveyFailed { file_id, source });
                }
            }
        }
    }

    tracing::debug!(
        "Survey of file {}: {} of {} source(s) answered",
        file_id,
        inventory.len(),
        surveyed.len()
    );
    inventory
}
