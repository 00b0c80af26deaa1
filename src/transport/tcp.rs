//! TCP transport
//!
//! One connection per request. The request is written as a single line of
//! JSON and the answer is read back as a single line of JSON. Tracker
//! requests go to the configured tracker address, peer requests to the
//! source they name.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::Transport;
use crate::config::TrackerConfig;
use crate::error::{LeechError, NetworkErrorKind, Result};
use crate::protocol::{Request, Response, Target};

/// Upper bound for one response line (a block plus JSON overhead)
const MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// Newline-delimited JSON over TCP
#[derive(Debug, Clone)]
pub struct TcpTransport {
    tracker: Option<SocketAddr>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl TcpTransport {
    /// Create a transport from the tracker configuration
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            tracker: config.address,
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
        }
    }

    fn resolve(&self, target: Target) -> Result<SocketAddr> {
        match target {
            Target::Tracker => self.tracker.ok_or_else(|| {
                LeechError::invalid_input("tracker.address", "No tracker address configured")
            }),
            Target::Peer(source) => Ok(source.socket_addr()),
        }
    }

    async fn exchange(&self, addr: SocketAddr, request: &Request) -> Result<Option<Response>> {
        let stream = match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(LeechError::network(
                    NetworkErrorKind::Timeout,
                    format!("connect to {} timed out", addr),
                ))
            }
        };

        let (read_half, mut write_half) = stream.into_split();
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        write_half.write_all(&line).await?;
        write_half.flush().await?;

        let mut reader = BufReader::new(read_half).take(MAX_LINE_LEN as u64);
        let mut answer = String::new();
        let read = match timeout(self.request_timeout, reader.read_line(&mut answer)).await {
            Ok(read) => read?,
            Err(_) => {
                tracing::debug!(
                    "{} to {} got no answer within {:?}",
                    request.kind(),
                    addr,
                    self.request_timeout
                );
                return Ok(None);
            }
        };

        if read == 0 || answer.trim().is_empty() {
            return Ok(None);
        }
        if read >= MAX_LINE_LEN && !answer.ends_with('\n') {
            return Err(LeechError::protocol(
                crate::error::ProtocolErrorKind::MalformedMessage,
                format!("response from {} exceeds {} bytes", addr, MAX_LINE_LEN),
            ));
        }

        Ok(Some(serde_json::from_str(answer.trim_end())?))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn submit(&self, request: Request) -> Result<Option<Response>> {
        let addr = self.resolve(request.target())?;
        self.exchange(addr, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CatalogEntry, FileId};
    use tokio::net::TcpListener;

    async fn serve_once(answer: Option<&'static str>) -> (SocketAddr, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            match answer {
                Some(answer) => {
                    write_half.write_all(answer.as_bytes()).await.unwrap();
                    write_half.write_all(b"\n").await.unwrap();
                }
                None => tokio::time::sleep(Duration::from_secs(5)).await,
            }
            line
        });
        (addr, handle)
    }

    fn transport(addr: SocketAddr, request_timeout_secs: u64) -> TcpTransport {
        TcpTransport::new(&TrackerConfig {
            address: Some(addr),
            request_timeout_secs,
            connect_timeout_secs: 2,
        })
    }

    #[tokio::test]
    async fn test_tracker_round_trip() {
        let (addr, server) =
            serve_once(Some(r#"{"type":"catalog","files":[{"id":7,"name":"movie.mp4","size":1000}]}"#))
                .await;

        let response = transport(addr, 5)
            .submit(Request::catalog_list())
            .await
            .unwrap();
        assert_eq!(
            response,
            Some(Response::Catalog {
                files: vec![CatalogEntry::new(FileId(7), "movie.mp4", 1000)],
            })
        );

        let sent = server.await.unwrap();
        assert_eq!(sent.trim_end(), r#"{"type":"list_catalog"}"#);
    }

    #[tokio::test]
    async fn test_missing_answer_is_null_response() {
        let (addr, _server) = serve_once(None).await;
        let response = transport(addr, 1)
            .submit(Request::sources(FileId(1)))
            .await
            .unwrap();
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_tracker_address_required() {
        let transport = TcpTransport::new(&TrackerConfig::default());
        let err = transport.submit(Request::catalog_list()).await.unwrap_err();
        assert!(matches!(err, LeechError::InvalidInput { .. }));
    }
}
