//! Error types for migration operations.

use crate::types::IslandId;
use thiserror::Error;

/// Errors that can occur while setting up or driving migration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AtollError {
    #[error("archipelago must have at least one island")]
    EmptyTopology,

    #[error("self id {self_id} out of range for {island_count} island(s)")]
    InvalidTopology { island_count: u32, self_id: u32 },

    #[error("migration requires at least two islands")]
    SoleIsland,

    #[error("fragment size must be non-zero")]
    ZeroFragmentSize,

    #[error("fragment size mismatch: expected {expected} bytes, got {actual}")]
    FragmentSizeMismatch { expected: usize, actual: usize },

    #[error("unknown island {0}")]
    UnknownIsland(IslandId),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("runner failure: {0}")]
    Runner(String),
}

/// Result type for migration operations.
pub type AtollResult<T> = Result<T, AtollError>;
