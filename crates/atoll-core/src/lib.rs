//! # Atoll Core
//!
//! Shared types for the Atoll island-model framework: island identifiers,
//! the archipelago topology each island sees, and the error taxonomy used
//! across the migration crates.

pub mod error;
pub mod topology;
pub mod types;

pub use error::{AtollError, AtollResult};
pub use topology::Topology;
pub use types::{Generation, IslandId};
