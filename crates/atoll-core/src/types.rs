//! Shared types used across the Atoll crates.

use serde::{Deserialize, Serialize};

/// Unique identifier for an island in the archipelago.
///
/// Islands are numbered densely from zero, so an id is also a valid
/// index into any per-island table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct IslandId(pub u32);

impl IslandId {
    /// Create a new island identifier.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the underlying island number.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for IslandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "island-{}", self.0)
    }
}

/// Monotonic generation counter on an island.
pub type Generation = u64;
