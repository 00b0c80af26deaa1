//! Typed error hierarchy for gosh-leech
//!
//! Errors carry enough context to decide whether the failed unit of work
//! (one tracker query, one source survey, one worker) can be retried.
//! None of them is fatal to the coordinator loop.

use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::FileId;

/// Main error type for the leech core
#[derive(Debug, Error)]
pub enum LeechError {
    /// Network-related errors (connection, timeout, unreachable peer, etc.)
    #[error("Network error: {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
        retryable: bool,
    },

    /// Storage/filesystem errors
    #[error("Storage error at {path:?}: {message}")]
    Storage {
        kind: StorageErrorKind,
        path: PathBuf,
        message: String,
    },

    /// Protocol-level errors (unexpected or malformed responses)
    #[error("Protocol error: {message}")]
    Protocol {
        kind: ProtocolErrorKind,
        message: String,
    },

    /// Invalid input from the host application
    #[error("Invalid input for '{field}': {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    /// File id unknown to the coordinator
    #[error("File not found: {0}")]
    NotFound(FileId),

    /// Coordinator is shutting down
    #[error("Coordinator is shutting down")]
    Shutdown,

    /// Internal error (bug)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Connection refused
    ConnectionRefused,
    /// Connection reset
    ConnectionReset,
    /// Connection or request timeout
    Timeout,
    /// The remote end never answered
    NoResponse,
    /// Host not reachable
    Unreachable,
    /// Other network error
    Other,
}

/// Storage error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// File/directory not found
    NotFound,
    /// Permission denied
    PermissionDenied,
    /// Write outside the bounds of the file
    OutOfBounds,
    /// Invalid path
    InvalidPath,
    /// I/O error
    Io,
}

/// Protocol error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// Response tag did not match the request
    UnexpectedResponse,
    /// Remote side answered with an error message
    RemoteError,
    /// Message could not be encoded or decoded
    MalformedMessage,
    /// Block payload does not fit the file layout
    InvalidBlock,
}

impl LeechError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { retryable, .. } => *retryable,
            Self::Storage { kind, .. } => matches!(kind, StorageErrorKind::Io),
            Self::Protocol { kind, .. } => matches!(kind, ProtocolErrorKind::RemoteError),
            _ => false,
        }
    }

    /// Create a network error
    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        let retryable = matches!(
            kind,
            NetworkErrorKind::Timeout
                | NetworkErrorKind::NoResponse
                | NetworkErrorKind::ConnectionReset
                | NetworkErrorKind::Unreachable
        );
        Self::Network {
            kind,
            message: message.into(),
            retryable,
        }
    }

    /// Create a storage error
    pub fn storage(
        kind: StorageErrorKind,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::Storage {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(kind: ProtocolErrorKind, message: impl Into<String>) -> Self {
        Self::Protocol {
            kind,
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }
}

/// Result type alias for leech operations
pub type Result<T> = std::result::Result<T, LeechError>;

impl From<std::io::Error> for LeechError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused => {
                Self::network(NetworkErrorKind::ConnectionRefused, err.to_string())
            }
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                Self::network(NetworkErrorKind::ConnectionReset, err.to_string())
            }
            ErrorKind::TimedOut => Self::network(NetworkErrorKind::Timeout, err.to_string()),
            ErrorKind::UnexpectedEof => {
                Self::network(NetworkErrorKind::NoResponse, err.to_string())
            }
            kind => {
                let kind = match kind {
                    ErrorKind::NotFound => StorageErrorKind::NotFound,
                    ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
                    _ => StorageErrorKind::Io,
                };
                Self::Storage {
                    kind,
                    path: PathBuf::new(),
                    message: err.to_string(),
                }
            }
        }
    }
}

impl From<serde_json::Error> for LeechError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(ProtocolErrorKind::MalformedMessage, err.to_string())
    }
}

impl From<tokio::task::JoinError> for LeechError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("task join error: {}", err))
    }
}
