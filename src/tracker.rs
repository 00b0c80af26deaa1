//! Tracker Client
//!
//! Typed access to the tracker over an opaque [`Transport`]: catalog
//! listings and the sources advertising a file.

use std::sync::Arc;

use crate::error::{LeechError, NetworkErrorKind, ProtocolErrorKind, Result};
use crate::protocol::{CatalogEntry, FileId, Request, Response, Source};
use crate::transport::Transport;

/// Tracker client
#[derive(Clone)]
pub struct TrackerClient {
    transport: Arc<dyn Transport>,
}

impl TrackerClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Underlying transport, shared with peer requests
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Fetch the full catalog of shareable files
    pub async fn list_catalog(&self) -> Result<Vec<CatalogEntry>> {
        match self.request(Request::catalog_list()).await? {
            Response::Catalog { files } => Ok(files),
            other => Err(unexpected("catalog", &other)),
        }
    }

    /// Fetch the sources advertising `file_id`
    pub async fn sources(&self, file_id: FileId) -> Result<Vec<Source>> {
        match self.request(Request::sources(file_id)).await? {
            Response::Sources {
                file_id: answered,
                sources,
            } if answered == file_id => Ok(sources),
            Response::Sources { file_id: answered, .. } => Err(LeechError::protocol(
                ProtocolErrorKind::UnexpectedResponse,
                format!("asked for sources of file {}, got file {}", file_id, answered),
            )),
            other => Err(unexpected("sources", &other)),
        }
    }

    /// Tracker requests have no null answer: an absent reply is a failure.
    async fn request(&self, request: Request) -> Result<Response> {
        let kind = request.kind();
        match self.transport.submit(request).await? {
            Some(Response::Error { message }) => Err(LeechError::protocol(
                ProtocolErrorKind::RemoteError,
                format!("tracker refused {}: {}", kind, message),
            )),
            Some(response) => Ok(response),
            None => Err(LeechError::network(
                NetworkErrorKind::NoResponse,
                format!("tracker did not answer {}", kind),
            )),
        }
    }
}

pub(crate) fn unexpected(expected: &str, got: &Response) -> LeechError {
    LeechError::protocol(
        ProtocolErrorKind::UnexpectedResponse,
        format!("expected {} response, got {}", expected, got.kind()),
    )
}
