//! Protocol types for gosh-leech
//!
//! This module contains all types that cross the core boundary:
//! - Identifiers (files, sources, blocks) and catalog entries
//! - Request and response payloads handed to the transport
//! - Events emitted by the coordinator
//! - Status snapshots
//!
//! These types are designed for serialization and can be used for IPC,
//! RPC, or any message-passing interface.

mod events;
mod message;
mod status;
mod types;

pub use events::LeechEvent;
pub use message::{Request, Response, Target};
pub use status::{FileStatus, LeechStatus};
pub use types::{BlockIndex, CatalogEntry, FileId, Source};
