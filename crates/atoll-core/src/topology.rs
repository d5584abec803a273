//! Archipelago topology — how many islands exist and which one we are.
//!
//! The topology is an explicit, immutable value constructed once at
//! process start and handed to every component that needs it. The only
//! questions it answers are "how many islands are there", "which island
//! am I", and "pick me a random peer that is not myself".

use crate::error::{AtollError, AtollResult};
use crate::types::IslandId;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One island's immutable view of the archipelago.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    island_count: u32,
    self_id: IslandId,
}

impl Topology {
    /// Create a topology for `island_count` islands, identifying as `self_id`.
    ///
    /// # Errors
    ///
    /// Returns `EmptyTopology` if `island_count` is zero, and
    /// `InvalidTopology` if `self_id` is not in `[0, island_count)`.
    /// Both are fatal at initialization.
    pub fn new(island_count: u32, self_id: IslandId) -> AtollResult<Self> {
        if island_count < 1 {
            return Err(AtollError::EmptyTopology);
        }
        if self_id.as_u32() >= island_count {
            return Err(AtollError::InvalidTopology {
                island_count,
                self_id: self_id.as_u32(),
            });
        }
        Ok(Self {
            island_count,
            self_id,
        })
    }

    /// Total number of islands in the archipelago.
    pub fn island_count(&self) -> u32 {
        self.island_count
    }

    /// This island's identity.
    pub fn self_id(&self) -> IslandId {
        self.self_id
    }

    /// Whether this archipelago has a single island (migration disabled).
    pub fn is_sole_island(&self) -> bool {
        self.island_count == 1
    }

    /// Draw a peer uniformly at random from all islands except this one.
    ///
    /// The draw is taken over the `island_count - 1` non-self islands and
    /// shifted past `self_id`, which gives the same distribution as
    /// rejection sampling without the retry loop.
    ///
    /// # Errors
    ///
    /// Returns `SoleIsland` if there is no other island to draw.
    pub fn random_peer<R: Rng>(&self, rng: &mut R) -> AtollResult<IslandId> {
        if self.island_count < 2 {
            return Err(AtollError::SoleIsland);
        }
        let raw = rng.random_range(0..self.island_count - 1);
        let peer = if raw >= self.self_id.as_u32() {
            raw + 1
        } else {
            raw
        };
        Ok(IslandId::new(peer))
    }
}
