//! Request and response payloads
//!
//! The core treats these as opaque values handed to a [`Transport`]. The
//! builders below are the only way the core constructs requests.
//!
//! [`Transport`]: crate::transport::Transport

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::types::{BlockIndex, CatalogEntry, FileId, Source};

/// Where a request has to be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The tracker
    Tracker,
    /// A peer
    Peer(Source),
}

/// Request sent to the tracker or to a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// List every shareable file
    ListCatalog,
    /// List peers advertising a file
    Sources { file_id: FileId },
    /// Ask a peer which blocks of a file it holds
    BlockStat { source: Source, file_id: FileId },
    /// Fetch one block from a peer
    FetchBlock {
        source: Source,
        file_id: FileId,
        index: BlockIndex,
    },
}

impl Request {
    pub fn catalog_list() -> Self {
        Self::ListCatalog
    }

    pub fn sources(file_id: FileId) -> Self {
        Self::Sources { file_id }
    }

    pub fn block_stat(source: Source, file_id: FileId) -> Self {
        Self::BlockStat { source, file_id }
    }

    pub fn fetch_block(source: Source, file_id: FileId, index: BlockIndex) -> Self {
        Self::FetchBlock {
            source,
            file_id,
            index,
        }
    }

    /// Destination of this request
    pub fn target(&self) -> Target {
        match self {
            Self::ListCatalog | Self::Sources { .. } => Target::Tracker,
            Self::BlockStat { source, .. } | Self::FetchBlock { source, .. } => {
                Target::Peer(*source)
            }
        }
    }

    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ListCatalog => "list_catalog",
            Self::Sources { .. } => "sources",
            Self::BlockStat { .. } => "block_stat",
            Self::FetchBlock { .. } => "fetch_block",
        }
    }
}

/// Tagged response to a [`Request`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Catalog {
        files: Vec<CatalogEntry>,
    },
    Sources {
        file_id: FileId,
        sources: Vec<Source>,
    },
    BlockStat {
        file_id: FileId,
        blocks: Vec<BlockIndex>,
    },
    Block {
        file_id: FileId,
        index: BlockIndex,
        data: Bytes,
    },
    /// The remote side refused or failed the request
    Error {
        message: String,
    },
}

impl Response {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Catalog { .. } => "catalog",
            Self::Sources { .. } => "sources",
            Self::BlockStat { .. } => "block_stat",
            Self::Block { .. } => "block",
            Self::Error { .. } => "error",
        }
    }
}
