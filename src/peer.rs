//! Peer requests
//!
//! Typed access to a single source over the shared [`Transport`]: block
//! inventory and block contents.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{LeechError, NetworkErrorKind, ProtocolErrorKind, Result};
use crate::protocol::{BlockIndex, FileId, Request, Response, Source};
use crate::tracker::unexpected;
use crate::transport::Transport;

/// Client for requests addressed to peers
#[derive(Clone)]
pub struct PeerClient {
    transport: Arc<dyn Transport>,
}

impl PeerClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Ask `source` which blocks of `file_id` it holds.
    ///
    /// Returns `Ok(None)` when the source never answered.
    pub async fn block_stat(&self, source: Source, file_id: FileId) -> Result<Option<Vec<BlockIndex>>> {
        match self.transport.submit(Request::block_stat(source, file_id)).await? {
            None => Ok(None),
            Some(Response::BlockStat { blocks, .. }) => Ok(Some(blocks)),
            Some(Response::Error { message }) => Err(LeechError::protocol(
                ProtocolErrorKind::RemoteError,
                format!("{} refused block stat: {}", source, message),
            )),
            Some(other) => Err(unexpected("block_stat", &other)),
        }
    }

    /// Fetch the content of one block from `source`
    pub async fn fetch_block(&self, source: Source, file_id: FileId, index: BlockIndex) -> Result<Bytes> {
        match self
            .transport
            .submit(Request::fetch_block(source, file_id, index))
            .await?
        {
            Some(Response::Block {
                index: answered,
                data,
                ..
            }) if answered == index => Ok(data),
            Some(Response::Block { index: answered, .. }) => Err(LeechError::protocol(
                ProtocolErrorKind::InvalidBlock,
                format!("{} sent block {} instead of {}", source, answered, index),
            )),
            Some(Response::Error { message }) => Err(LeechError::protocol(
                ProtocolErrorKind::RemoteError,
                format!("{} refused block {}: {}", source, index, message),
            )),
            Some(other) => Err(unexpected("block", &other)),
            None => Err(LeechError::network(
                NetworkErrorKind::NoResponse,
                format!("{} did not answer for block {}", source, index),
            )),
        }
    }
}
