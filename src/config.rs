//! Leech configuration
//!
//! This module contains all configuration options for the leech core.

use crate::error::{LeechError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default block size (eMule-style 180 KiB blocks)
pub const DEFAULT_BLOCK_SIZE: u64 = 180 * 1024;

/// Main configuration for the leech core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeechConfig {
    /// Directory files are loaded into
    pub load_dir: PathBuf,

    /// Size of one block in bytes (the last block of a file may be shorter)
    pub block_size: u64,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// How long shutdown waits for interrupted workers to unwind
    #[serde(default = "default_worker_shutdown_timeout_secs")]
    pub worker_shutdown_timeout_secs: u64,

    /// Tracker configuration
    #[serde(default)]
    pub tracker: TrackerConfig,
}

/// Tracker and transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracker address (required by the TCP transport)
    pub address: Option<SocketAddr>,

    /// Time to wait for an answer before treating it as absent, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_worker_shutdown_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            address: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl TrackerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for LeechConfig {
    fn default() -> Self {
        Self {
            load_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            block_size: DEFAULT_BLOCK_SIZE,
            event_channel_capacity: default_event_channel_capacity(),
            worker_shutdown_timeout_secs: default_worker_shutdown_timeout_secs(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl LeechConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the load directory
    pub fn load_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.load_dir = path.into();
        self
    }

    /// Set the block size
    pub fn block_size(mut self, size: u64) -> Self {
        self.block_size = size;
        self
    }

    /// Set the tracker address
    pub fn tracker_address(mut self, addr: SocketAddr) -> Self {
        self.tracker.address = Some(addr);
        self
    }

    /// Set the request timeout
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.tracker.request_timeout_secs = secs;
        self
    }

    /// Set the worker shutdown timeout
    pub fn worker_shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.worker_shutdown_timeout_secs = secs;
        self
    }

    pub fn worker_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_shutdown_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.load_dir.exists() && !self.load_dir.is_dir() {
            return Err(LeechError::invalid_input(
                "load_dir",
                format!("Path is not a directory: {:?}", self.load_dir),
            ));
        }

        if self.block_size == 0 {
            return Err(LeechError::invalid_input("block_size", "Must be at least 1"));
        }

        if self.block_size > u32::MAX as u64 {
            return Err(LeechError::invalid_input(
                "block_size",
                format!("Must not exceed {} bytes", u32::MAX),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(LeechError::invalid_input(
                "event_channel_capacity",
                "Must be at least 1",
            ));
        }

        if self.tracker.request_timeout_secs == 0 {
            return Err(LeechError::invalid_input(
                "request_timeout_secs",
                "Must be at least 1",
            ));
        }

        Ok(())
    }
}
