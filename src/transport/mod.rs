//! Transport collaborators
//!
//! The core never speaks a wire format itself. It hands a [`Request`] to a
//! [`Transport`] and waits for the tagged [`Response`]. Timeouts and retries
//! are the transport's business: an answer that never arrives is reported as
//! `Ok(None)`, a broken exchange as `Err`.

pub mod memory;
#[cfg(feature = "tcp")]
pub mod tcp;

pub use memory::MemoryTransport;
#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{Request, Response};

/// Request/response channel to the tracker and to peers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `request` to its [`target`](Request::target) and wait for the answer.
    async fn submit(&self, request: Request) -> Result<Option<Response>>;
}
