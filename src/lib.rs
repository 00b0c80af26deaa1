//! # gosh-leech
//!
//! Download coordination core for tracker-based peer-to-peer file sharing.
//!
//! ## Features
//!
//! - **Load queue**: any task can queue file ids; a single loop processes them in order
//! - **Inventory survey**: every source of a file is asked concurrently which blocks it holds
//! - **Block assignment**: each block is fetched from exactly one source, ties broken at random
//! - **Workers**: one fetch task per source, interruptible, tracked until shutdown
//! - **Pluggable I/O**: transport and storage are traits, with in-memory, TCP and file implementations
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gosh_leech::{LeechConfig, LeechCoordinator, TcpTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LeechConfig::default()
//!         .tracker_address("127.0.0.1:8899".parse()?)
//!         .load_dir("/tmp/leech");
//!     let transport = Arc::new(TcpTransport::new(&config.tracker));
//!     let coordinator = LeechCoordinator::new(config, transport).await?;
//!
//!     // Subscribe before queueing so no event is missed
//!     let mut events = coordinator.subscribe();
//!     coordinator.enqueue_load(7)?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     coordinator.shutdown().await?;
//!     Ok(())
//! }
//! ```

// Modules
pub mod assigner;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod file_state;
pub mod peer;
pub mod protocol;
pub mod storage;
pub mod survey;
pub mod tracker;
pub mod transport;
pub mod worker;

// Re-exports for convenience
pub use assigner::{assign_blocks, assign_blocks_with, BlockAssignment, BlockInventory};
pub use catalog::CatalogCache;
pub use config::{LeechConfig, TrackerConfig, DEFAULT_BLOCK_SIZE};
pub use coordinator::LeechCoordinator;
pub use error::{LeechError, NetworkErrorKind, ProtocolErrorKind, Result, StorageErrorKind};
pub use file_state::{FileDownloadState, WorkerGuard};
pub use peer::PeerClient;
pub use protocol::{
    BlockIndex, CatalogEntry, FileId, FileStatus, LeechEvent, LeechStatus, Request, Response,
    Source, Target,
};
pub use survey::{survey_sources, BlockStatRequester};
pub use tracker::TrackerClient;
pub use worker::{BlockFetchWorker, WorkerOutcome};

// Collaborator exports
pub use storage::{
    BlockStorage, FileStorage, FileStorageProvider, MemoryStorage, MemoryStorageProvider,
    StorageProvider,
};
#[cfg(feature = "tcp")]
pub use transport::TcpTransport;
pub use transport::{MemoryTransport, Transport};
