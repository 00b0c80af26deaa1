//! Leech coordinator
//!
//! The coordinator owns the load-request queue and the single loop that
//! drains it. For every queued file id the loop resolves the file in the
//! catalog, asks the tracker for its sources, surveys every known source for
//! its block inventory, partitions the blocks and spawns one fetch worker per
//! source with a non-empty share. Workers then run on their own, against the
//! shared per-file state, while the loop moves on to the next id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::assigner::assign_blocks;
use crate::catalog::CatalogCache;
use crate::config::LeechConfig;
use crate::error::{LeechError, Result, StorageErrorKind};
use crate::file_state::FileDownloadState;
use crate::peer::PeerClient;
use crate::protocol::{BlockIndex, CatalogEntry, FileId, FileStatus, LeechEvent, LeechStatus, Source};
use crate::storage::{FileStorageProvider, StorageProvider};
use crate::survey::survey_sources;
use crate::tracker::TrackerClient;
use crate::transport::Transport;
use crate::worker::{BlockFetchWorker, WorkerOutcome};

/// A spawned worker tracked for shutdown
struct WorkerHandle {
    file_id: FileId,
    source: Source,
    cancel: CancellationToken,
    task: JoinHandle<WorkerOutcome>,
}

/// State shared between the public handle and the load loop
struct Shared {
    config: LeechConfig,
    tracker: TrackerClient,
    peers: PeerClient,
    storage: Arc<dyn StorageProvider>,
    /// Files that went through at least one assignment round
    files: RwLock<HashMap<FileId, Arc<FileDownloadState>>>,
    event_tx: broadcast::Sender<LeechEvent>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl Shared {
    fn emit(&self, event: LeechEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn prune_workers(&self) {
        self.workers.lock().retain(|handle| !handle.task.is_finished());
    }
}

/// Download coordinator
///
/// Cheap to query from any task. Dropping it stops the load loop and
/// interrupts every worker; use [`shutdown`](Self::shutdown) to also wait
/// for them.
pub struct LeechCoordinator {
    shared: Arc<Shared>,
    queue_tx: mpsc::UnboundedSender<FileId>,
    load_loop: Mutex<Option<JoinHandle<()>>>,
}

impl LeechCoordinator {
    /// Create a coordinator writing files under `config.load_dir`
    pub async fn new(config: LeechConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_storage(config, transport, Arc::new(FileStorageProvider)).await
    }

    /// Create a coordinator talking to the tracker at `config.tracker.address`
    /// over TCP
    #[cfg(feature = "tcp")]
    pub async fn connect(config: LeechConfig) -> Result<Self> {
        if config.tracker.address.is_none() {
            return Err(LeechError::invalid_input(
                "tracker.address",
                "A tracker address is required",
            ));
        }
        let transport = Arc::new(crate::transport::TcpTransport::new(&config.tracker));
        Self::new(config, transport).await
    }

    /// Create a coordinator with a custom storage provider
    pub async fn with_storage(
        config: LeechConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn StorageProvider>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.load_dir)
            .await
            .map_err(|e| {
                LeechError::storage(
                    StorageErrorKind::Io,
                    &config.load_dir,
                    format!("Failed to create load directory: {}", e),
                )
            })?;

        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            tracker: TrackerClient::new(Arc::clone(&transport)),
            peers: PeerClient::new(transport),
            storage,
            files: RwLock::new(HashMap::new()),
            event_tx,
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            config,
        });

        let load_loop = LoadLoop {
            shared: Arc::clone(&shared),
            queue_rx,
            catalog: CatalogCache::new(),
        };
        let handle = tokio::spawn(load_loop.run());

        tracing::info!(
            "Leech coordinator started, loading into {:?}",
            shared.config.load_dir
        );

        Ok(Self {
            shared,
            queue_tx,
            load_loop: Mutex::new(Some(handle)),
        })
    }

    /// Queue `file_id` for loading. Ids are processed one at a time, in
    /// arrival order.
    pub fn enqueue_load(&self, file_id: impl Into<FileId>) -> Result<()> {
        let file_id = file_id.into();
        if self.shared.shutdown.is_cancelled() {
            return Err(LeechError::Shutdown);
        }
        self.queue_tx
            .send(file_id)
            .map_err(|_| LeechError::Shutdown)?;
        tracing::debug!("Queued load request for file {}", file_id);
        Ok(())
    }

    /// Stop accepting ids and interrupt every worker, without waiting.
    ///
    /// Ids already queued are still processed before the loop exits.
    pub fn request_shutdown(&self) {
        if !self.shared.shutdown.is_cancelled() {
            tracing::info!("Leech coordinator shutdown requested");
        }
        self.shared.shutdown.cancel();
    }

    /// Request shutdown and wait for the load loop and its workers to stop
    pub async fn shutdown(&self) -> Result<()> {
        self.request_shutdown();

        let handle = self.load_loop.lock().take();
        if let Some(mut handle) = handle {
            let limit = self.shared.config.worker_shutdown_timeout()
                + self.shared.config.tracker.request_timeout();
            match tokio::time::timeout(limit, &mut handle).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!("Load loop did not stop within {:?}, aborting", limit);
                    handle.abort();
                }
            }
        }

        Ok(())
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Subscribe to coordinator and worker events
    pub fn subscribe(&self) -> broadcast::Receiver<LeechEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn config(&self) -> &LeechConfig {
        &self.shared.config
    }

    /// Registered state of `file_id`
    pub fn file(&self, file_id: impl Into<FileId>) -> Option<Arc<FileDownloadState>> {
        self.shared.files.read().get(&file_id.into()).cloned()
    }

    pub fn file_status(&self, file_id: impl Into<FileId>) -> Result<FileStatus> {
        let file_id = file_id.into();
        self.file(file_id)
            .map(|file| file.status())
            .ok_or(LeechError::NotFound(file_id))
    }

    /// Number of tracked workers that have not finished
    pub fn active_workers(&self) -> usize {
        self.shared
            .workers
            .lock()
            .iter()
            .filter(|handle| !handle.task.is_finished())
            .count()
    }

    pub fn status(&self) -> LeechStatus {
        let mut files: Vec<FileStatus> = self
            .shared
            .files
            .read()
            .values()
            .map(|file| file.status())
            .collect();
        files.sort_by_key(|file| file.id);

        LeechStatus {
            shutting_down: self.is_shutdown(),
            files,
        }
    }

    /// Human-readable status, also written to the log at info level
    pub fn status_snapshot(&self) -> String {
        let text = self.status().to_string();
        tracing::info!("{}", text);
        text
    }
}

impl Drop for LeechCoordinator {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

/// The single consumer of the load queue
struct LoadLoop {
    shared: Arc<Shared>,
    queue_rx: mpsc::UnboundedReceiver<FileId>,
    catalog: CatalogCache,
}

impl LoadLoop {
    async fn run(mut self) {
        loop {
            let file_id = tokio::select! {
                biased;
                _ = self.shared.shutdown.cancelled() => break,
                next = self.queue_rx.recv() => match next {
                    Some(file_id) => file_id,
                    None => break,
                },
            };

            self.process(file_id).await;
            self.shared.prune_workers();
        }

        self.stop().await;
    }

    async fn process(&mut self, file_id: FileId) {
        self.shared.emit(LeechEvent::LoadStarted { file_id });

        if let Err(e) = self.load(file_id).await {
            tracing::warn!("Failed to load file {}: {}", file_id, e);
            self.shared.emit(LeechEvent::LoadFailed {
                file_id,
                error: e.to_string(),
            });
        }
    }

    async fn load(&mut self, file_id: FileId) -> Result<()> {
        let shared = Arc::clone(&self.shared);

        let Some(entry) = self.catalog.resolve(file_id, &shared.tracker).await? else {
            tracing::warn!("File {} unresolvable: not in the tracker catalog", file_id);
            shared.emit(LeechEvent::FileUnresolvable { file_id });
            return Ok(());
        };

        let advertised = shared.tracker.sources(file_id).await?;
        let file = self.file_state(&entry).await?;

        let new = file.merge_sources(advertised);
        shared.emit(LeechEvent::SourcesDiscovered {
            file_id,
            new,
            total: file.source_count(),
        });

        let sources = file.sources();
        let mut inventory = survey_sources(
            &shared.peers,
            file_id,
            &sources,
            &shared.shutdown,
            Some(&shared.event_tx),
        )
        .await;

        if shared.shutdown.is_cancelled() {
            tracing::debug!("Survey of file {} interrupted by shutdown", file_id);
        }

        for (source, blocks) in inventory.iter_mut() {
            let reported = blocks.len();
            blocks.retain(|index| file.block_span(*index).is_some());
            if blocks.len() < reported {
                tracing::debug!(
                    "Source {} reported {} block(s) past the end of file {}",
                    source,
                    reported - blocks.len(),
                    file_id
                );
            }
        }

        let shares: Vec<(Source, Vec<BlockIndex>)> = assign_blocks(&inventory)
            .into_iter()
            .map(|(source, blocks)| (source, file.missing_blocks(&blocks)))
            .filter(|(_, blocks)| !blocks.is_empty())
            .collect();

        self.register(&file);

        let spawned = shares.len();
        let assigned: usize = shares.iter().map(|(_, blocks)| blocks.len()).sum();
        for (source, blocks) in shares {
            let cancel = shared.shutdown.child_token();
            let worker = BlockFetchWorker::new(
                source,
                blocks,
                Arc::clone(&file),
                shared.peers.clone(),
                shared.event_tx.clone(),
                cancel.clone(),
            );
            let task = worker.spawn();
            shared.workers.lock().push(WorkerHandle {
                file_id,
                source,
                cancel,
                task,
            });
        }

        tracing::info!(
            "File {} '{}': {} worker(s) spawned for {} block(s) from {} surveyed source(s)",
            file_id,
            file.name(),
            spawned,
            assigned,
            inventory.len()
        );
        shared.emit(LeechEvent::RoundAssigned {
            file_id,
            workers: spawned,
            blocks: assigned,
        });

        Ok(())
    }

    /// Look up the state of `entry`, creating it and opening its storage the
    /// first time the file is seen
    async fn file_state(&mut self, entry: &CatalogEntry) -> Result<Arc<FileDownloadState>> {
        let known = self
            .shared
            .files
            .read()
            .get(&entry.id)
            .cloned();
        if let Some(file) = known {
            return Ok(file);
        }

        let path = FileDownloadState::path_for(&self.shared.config.load_dir, entry);
        let storage = self.shared.storage.open(&path, entry.size).await?;
        let file = Arc::new(FileDownloadState::new(
            entry,
            path,
            self.shared.config.block_size,
            storage,
        ));
        tracing::debug!("Created state for file {} at {:?}", entry.id, file.path());
        Ok(file)
    }

    fn register(&self, file: &Arc<FileDownloadState>) {
        self.shared
            .files
            .write()
            .entry(file.id())
            .or_insert_with(|| Arc::clone(file));
    }

    /// Process the ids still queued, then wait for every worker to stop
    async fn stop(mut self) {
        self.queue_rx.close();
        let mut drained = 0;
        while let Ok(file_id) = self.queue_rx.try_recv() {
            self.process(file_id).await;
            drained += 1;
        }
        if drained > 0 {
            tracing::info!("Processed {} queued load request(s) during shutdown", drained);
        }

        let handles = std::mem::take(&mut *self.shared.workers.lock());
        for handle in &handles {
            handle.cancel.cancel();
        }

        let deadline = tokio::time::Instant::now() + self.shared.config.worker_shutdown_timeout();
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle.task).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => {
                    tracing::error!(
                        "Worker for file {} from {} panicked: {:?}",
                        handle.file_id,
                        handle.source,
                        e
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        "Worker for file {} from {} did not stop in time, aborting",
                        handle.file_id,
                        handle.source
                    );
                    handle.task.abort();
                }
            }
        }

        tracing::debug!("Load loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorageProvider;
    use crate::transport::MemoryTransport;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn coordinator(transport: Arc<MemoryTransport>) -> (LeechCoordinator, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = LeechConfig::new().load_dir(dir.path()).block_size(200);
        let coordinator = LeechCoordinator::with_storage(
            config,
            transport,
            Arc::new(MemoryStorageProvider::new()),
        )
        .await
        .unwrap();
        (coordinator, dir)
    }

    async fn next_matching(
        rx: &mut broadcast::Receiver<LeechEvent>,
        predicate: impl Fn(&LeechEvent) -> bool,
    ) -> LeechEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                if predicate(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_rejected() {
        let (coordinator, _dir) = coordinator(Arc::new(MemoryTransport::new())).await;
        coordinator.shutdown().await.unwrap();

        assert!(coordinator.is_shutdown());
        assert!(matches!(coordinator.enqueue_load(1), Err(LeechError::Shutdown)));
        // a second shutdown is a no-op
        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_file_status() {
        let (coordinator, _dir) = coordinator(Arc::new(MemoryTransport::new())).await;
        assert!(matches!(
            coordinator.file_status(3),
            Err(LeechError::NotFound(FileId(3)))
        ));
    }

    #[tokio::test]
    async fn test_file_registered_after_round_without_workers() {
        let transport = Arc::new(MemoryTransport::new());
        let source = Source::new(Ipv4Addr::new(10, 0, 0, 1), 4662);
        transport.add_file(CatalogEntry::new(5, "empty.bin", 400));
        transport.add_source(FileId(5), source);
        let (coordinator, _dir) = coordinator(transport).await;
        let mut rx = coordinator.subscribe();

        coordinator.enqueue_load(5).unwrap();
        let event = next_matching(&mut rx, |e| matches!(e, LeechEvent::RoundAssigned { .. })).await;

        assert_eq!(
            event,
            LeechEvent::RoundAssigned {
                file_id: FileId(5),
                workers: 0,
                blocks: 0,
            }
        );
        let file = coordinator.file(5).expect("file registered");
        assert_eq!(file.outstanding_workers(), 0);
        assert_eq!(file.source_count(), 1);

        let text = coordinator.status_snapshot();
        assert!(text.starts_with("Current active files 1"));
        assert!(text.contains("'empty.bin'"));
        assert!(text.contains("0/2 blocks"));
    }

    #[tokio::test]
    async fn test_tracker_failure_leaves_file_unregistered() {
        let transport = Arc::new(MemoryTransport::new());
        transport.add_file(CatalogEntry::new(5, "empty.bin", 400));
        transport.set_tracker_down(true);
        let (coordinator, _dir) = coordinator(transport).await;
        let mut rx = coordinator.subscribe();

        coordinator.enqueue_load(5).unwrap();
        next_matching(&mut rx, |e| matches!(e, LeechEvent::LoadFailed { .. })).await;

        assert!(coordinator.file(5).is_none());
        assert_eq!(coordinator.status().active_files(), 0);
    }

    #[tokio::test]
    async fn test_status_snapshot_lists_registered_files() {
        let transport = Arc::new(MemoryTransport::new());
        let source = Source::new(Ipv4Addr::new(10, 0, 0, 1), 4662);
        transport.add_file(CatalogEntry::new(2, "song.ogg", 300));
        transport.add_source(FileId(2), source);
        transport.add_block(source, FileId(2), 0, vec![1u8; 200]);
        transport.add_block(source, FileId(2), 1, vec![2u8; 100]);
        let (coordinator, _dir) = coordinator(transport).await;
        let mut rx = coordinator.subscribe();

        coordinator.enqueue_load(2).unwrap();
        next_matching(&mut rx, |e| matches!(e, LeechEvent::FileCompleted { .. })).await;

        let text = coordinator.status_snapshot();
        assert!(text.starts_with("Current active files 1"));
        assert!(text.contains("'song.ogg'"));
        assert!(text.contains("2/2 blocks"));
        assert!(coordinator.file_status(2).unwrap().is_complete());
    }
}
