//! Ranking and deduplication of scanned access points
//!
//! A scan often reports the same access point more than once. The catalog
//! keeps only the best sighting of each:
//!
//! 1. Stable sort by quality, best first (equal qualities keep scan order)
//! 2. Walk the sorted list and keep a cell only if its [`CellKey`] is new
//!
//! Because the sort runs first, the surviving copy of a duplicate is always
//! the highest-quality one.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::wifi::{CellKey, NetworkCell, WifiFacility};

/// Deduplicated access points ordered by descending quality
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkCatalog {
    cells: Vec<NetworkCell>,
}

impl NetworkCatalog {
    /// Build a catalog from raw scan results
    pub fn from_cells(mut cells: Vec<NetworkCell>) -> Self {
        cells.sort_by(|a, b| b.quality.cmp(&a.quality));

        let mut seen: HashSet<CellKey> = HashSet::with_capacity(cells.len());
        cells.retain(|cell| seen.insert(cell.key()));

        Self { cells }
    }

    /// Network names in catalog order
    pub fn ssids(&self) -> Vec<String> {
        self.cells.iter().map(|cell| cell.ssid.clone()).collect()
    }

    /// The ranked cells
    pub fn cells(&self) -> &[NetworkCell] {
        &self.cells
    }

    /// The strongest cell, if any
    pub fn best(&self) -> Option<&NetworkCell> {
        self.cells.first()
    }

    /// The strongest cell advertising `ssid`
    pub fn find(&self, ssid: &str) -> Option<&NetworkCell> {
        self.cells.iter().find(|cell| cell.ssid == ssid)
    }

    /// Iterate over the ranked cells
    pub fn iter(&self) -> std::slice::Iter<'_, NetworkCell> {
        self.cells.iter()
    }

    /// Number of distinct access points
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if nothing was found
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl IntoIterator for NetworkCatalog {
    type Item = NetworkCell;
    type IntoIter = std::vec::IntoIter<NetworkCell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

impl<'a> IntoIterator for &'a NetworkCatalog {
    type Item = &'a NetworkCell;
    type IntoIter = std::slice::Iter<'a, NetworkCell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

/// Scans one wireless interface and ranks what it sees
#[derive(Clone)]
pub struct NetworkDiscovery {
    facility: Arc<dyn WifiFacility>,
    interface: String,
}

impl NetworkDiscovery {
    /// Create a discovery service for `interface`
    pub fn new(facility: Arc<dyn WifiFacility>, interface: impl Into<String>) -> Self {
        Self {
            facility,
            interface: interface.into(),
        }
    }

    /// Get the scanned interface
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Scan and build a catalog
    ///
    /// An empty scan gives an empty catalog. Facility failures are returned
    /// unchanged.
    pub async fn discover(&self) -> Result<NetworkCatalog> {
        let raw = self.facility.list_cells(&self.interface).await?;
        let observed = raw.len();

        let catalog = NetworkCatalog::from_cells(raw);
        debug!(
            interface = %self.interface,
            facility = self.facility.name(),
            observed,
            distinct = catalog.len(),
            "Wi-Fi discovery complete"
        );

        Ok(catalog)
    }
}

impl std::fmt::Debug for NetworkDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkDiscovery")
            .field("facility", &self.facility.name())
            .field("interface", &self.interface)
            .finish()
    }
}
