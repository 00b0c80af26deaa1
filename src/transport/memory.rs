//! In-memory transport
//!
//! A scriptable swarm living in process memory: a tracker catalog, the
//! sources advertised for each file, and the blocks each peer holds.
//! Peers can be silenced (they never answer) or slowed down. Every
//! request is counted so tests can assert on traffic.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::Transport;
use crate::error::{LeechError, NetworkErrorKind, Result};
use crate::protocol::{BlockIndex, CatalogEntry, FileId, Request, Response, Source};

#[derive(Debug, Default)]
struct Swarm {
    catalog: Vec<CatalogEntry>,
    tracker_down: bool,
    sources: HashMap<FileId, Vec<Source>>,
    peers: HashMap<Source, MemoryPeer>,
}

#[derive(Debug, Default)]
struct MemoryPeer {
    files: HashMap<FileId, BTreeMap<BlockIndex, Bytes>>,
    silent: bool,
    unreachable: bool,
    latency: Duration,
    fetch_latency: Duration,
}

/// Request counters
#[derive(Debug, Default)]
struct Counters {
    catalog: AtomicUsize,
    sources: AtomicUsize,
    block_stat: AtomicUsize,
    fetch_block: AtomicUsize,
}

/// Transport backed by an in-process swarm
#[derive(Debug, Default)]
pub struct MemoryTransport {
    swarm: RwLock<Swarm>,
    counters: Counters,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to the tracker catalog
    pub fn add_file(&self, entry: CatalogEntry) {
        let mut swarm = self.swarm.write();
        swarm.catalog.retain(|e| e.id != entry.id);
        swarm.catalog.push(entry);
    }

    /// Advertise `source` as holding `file_id` on the tracker
    pub fn add_source(&self, file_id: FileId, source: Source) {
        let mut swarm = self.swarm.write();
        let sources = swarm.sources.entry(file_id).or_default();
        if !sources.contains(&source) {
            sources.push(source);
        }
        swarm.peers.entry(source).or_default();
    }

    /// Give `source` the content of one block
    pub fn add_block(&self, source: Source, file_id: FileId, index: BlockIndex, data: impl Into<Bytes>) {
        self.swarm
            .write()
            .peers
            .entry(source)
            .or_default()
            .files
            .entry(file_id)
            .or_default()
            .insert(index, data.into());
    }

    /// Make `source` accept requests but never answer them
    pub fn set_silent(&self, source: Source, silent: bool) {
        self.swarm.write().peers.entry(source).or_default().silent = silent;
    }

    /// Make requests to `source` fail at the transport level
    pub fn set_unreachable(&self, source: Source, unreachable: bool) {
        self.swarm.write().peers.entry(source).or_default().unreachable = unreachable;
    }

    /// Delay every answer from `source`
    pub fn set_latency(&self, source: Source, latency: Duration) {
        self.swarm.write().peers.entry(source).or_default().latency = latency;
    }

    /// Delay only block transfers from `source`, on top of its latency
    pub fn set_fetch_latency(&self, source: Source, latency: Duration) {
        self.swarm.write().peers.entry(source).or_default().fetch_latency = latency;
    }

    /// Make every tracker request fail at the transport level
    pub fn set_tracker_down(&self, down: bool) {
        self.swarm.write().tracker_down = down;
    }

    pub fn catalog_requests(&self) -> usize {
        self.counters.catalog.load(Ordering::SeqCst)
    }

    pub fn sources_requests(&self) -> usize {
        self.counters.sources.load(Ordering::SeqCst)
    }

    pub fn block_stat_requests(&self) -> usize {
        self.counters.block_stat.load(Ordering::SeqCst)
    }

    pub fn fetch_block_requests(&self) -> usize {
        self.counters.fetch_block.load(Ordering::SeqCst)
    }

    fn tracker_response(&self, request: &Request) -> Result<Option<Response>> {
        let swarm = self.swarm.read();
        if swarm.tracker_down {
            return Err(LeechError::network(
                NetworkErrorKind::Unreachable,
                "tracker unreachable",
            ));
        }
        let response = match request {
            Request::ListCatalog => Response::Catalog {
                files: swarm.catalog.clone(),
            },
            Request::Sources { file_id } => Response::Sources {
                file_id: *file_id,
                sources: swarm.sources.get(file_id).cloned().unwrap_or_default(),
            },
            other => Response::Error {
                message: format!("tracker cannot answer {}", other.kind()),
            },
        };
        Ok(Some(response))
    }

    /// Returns the peer latency and its answer, `None` for a silent peer.
    fn peer_response(&self, source: Source, request: &Request) -> Result<(Duration, Option<Response>)> {
        let swarm = self.swarm.read();
        let peer = swarm.peers.get(&source).ok_or_else(|| {
            LeechError::network(
                NetworkErrorKind::ConnectionRefused,
                format!("no peer listening at {}", source),
            )
        })?;
        if peer.unreachable {
            return Err(LeechError::network(
                NetworkErrorKind::Unreachable,
                format!("peer {} unreachable", source),
            ));
        }
        let delay = match request {
            Request::FetchBlock { .. } => peer.latency + peer.fetch_latency,
            _ => peer.latency,
        };
        if peer.silent {
            return Ok((delay, None));
        }

        let response = match request {
            Request::BlockStat { file_id, .. } => Response::BlockStat {
                file_id: *file_id,
                blocks: peer
                    .files
                    .get(file_id)
                    .map(|blocks| blocks.keys().copied().collect())
                    .unwrap_or_default(),
            },
            Request::FetchBlock { file_id, index, .. } => {
                match peer.files.get(file_id).and_then(|blocks| blocks.get(index)) {
                    Some(data) => Response::Block {
                        file_id: *file_id,
                        index: *index,
                        data: data.clone(),
                    },
                    None => Response::Error {
                        message: format!("block {} of file {} not held", index, file_id),
                    },
                }
            }
            other => Response::Error {
                message: format!("peer cannot answer {}", other.kind()),
            },
        };
        Ok((delay, Some(response)))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn submit(&self, request: Request) -> Result<Option<Response>> {
        let counter = match &request {
            Request::ListCatalog => &self.counters.catalog,
            Request::Sources { .. } => &self.counters.sources,
            Request::BlockStat { .. } => &self.counters.block_stat,
            Request::FetchBlock { .. } => &self.counters.fetch_block,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        match request.target() {
            crate::protocol::Target::Tracker => self.tracker_response(&request),
            crate::protocol::Target::Peer(source) => {
                let (latency, response) = self.peer_response(source, &request)?;
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                Ok(response)
            }
        }
    }
}
