//! # Atoll Migration
//!
//! Non-blocking migration channels for island-model evolutionary
//! computation. Each island polls two independent state machines once per
//! generation: an [`Immigration`] channel that keeps at most one receive
//! outstanding, and an [`Emigration`] channel that keeps at most one send
//! outstanding toward a randomly drawn peer. Neither ever blocks the
//! evolutionary loop; "not complete yet" is an ordinary return value.
//!
//! Transports hide behind the [`Fabric`] trait. [`MemoryFabric`] is the
//! in-process implementation used for tests and single-process
//! archipelago simulations driven by [`ArchipelagoRunner`].

pub mod emigration;
pub mod immigration;
pub mod memory;
pub mod runner;
pub mod transport;

pub use emigration::{Emigration, EmigrationPoll};
pub use immigration::{Immigration, ImmigrationPoll};
pub use memory::{MemoryFabric, MemoryPort};
pub use runner::{ArchipelagoRunner, Island, RunReport, RunnerConfig};
pub use transport::{Fabric, Probe, RecvTicket, SendTicket};
