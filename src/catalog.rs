//! Catalog cache
//!
//! Local copy of the tracker catalog. The whole cache is replaced on every
//! refresh, and a refresh only happens when a looked-up id is missing.
//! The cache belongs to the coordinator loop and is never shared.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::protocol::{CatalogEntry, FileId};
use crate::tracker::TrackerClient;

#[derive(Debug, Default)]
pub struct CatalogCache {
    entries: BTreeMap<FileId, CatalogEntry>,
    refreshes: usize,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: FileId) -> Option<&CatalogEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of full refreshes performed so far
    pub fn refreshes(&self) -> usize {
        self.refreshes
    }

    /// Replace the cache with the tracker's current catalog.
    ///
    /// On failure the previous contents are kept.
    pub async fn refresh(&mut self, tracker: &TrackerClient) -> Result<()> {
        let files = tracker.list_catalog().await?;
        self.entries = files.into_iter().map(|entry| (entry.id, entry)).collect();
        self.refreshes += 1;
        tracing::debug!("Catalog refreshed: {} file(s)", self.entries.len());
        Ok(())
    }

    /// Look up `id`, refreshing once from the tracker on a miss.
    ///
    /// `Ok(None)` means the id is unknown to the tracker as well.
    pub async fn resolve(&mut self, id: FileId, tracker: &TrackerClient) -> Result<Option<CatalogEntry>> {
        if let Some(entry) = self.entries.get(&id) {
            return Ok(Some(entry.clone()));
        }
        self.refresh(tracker).await?;
        Ok(self.entries.get(&id).cloned())
    }
}
