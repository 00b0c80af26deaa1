//! Core protocol types
//!
//! Fundamental identifiers shared by the tracker, the peers and the core.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Index of a fixed-size block inside a file
pub type BlockIndex = u32;

/// Identifier of a file in the tracker catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u32);

impl FileId {
    /// Get the raw numeric id
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for FileId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A peer from which blocks of a file can be fetched.
///
/// Purely an identifier: it owns no connection. Ordering is by address then
/// port, which keeps assignment rounds reproducible under a fixed seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Source {
    /// IP address
    pub ip: IpAddr,
    /// Port
    pub port: u16,
}

impl Source {
    /// Create a new source
    pub fn new(ip: impl Into<IpAddr>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Convert to socket address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl From<SocketAddr> for Source {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// One file as known by the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Catalog id
    pub id: FileId,
    /// File name as advertised
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

impl CatalogEntry {
    pub fn new(id: impl Into<FileId>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
        }
    }
}
