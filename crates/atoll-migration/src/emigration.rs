//! Emigration channel — the sending half of migration.
//!
//! Single-flight: at most one send is ever outstanding. Each new send goes
//! to a freshly drawn random peer (never this island), with the fragment
//! produced by the caller immediately before the send is issued. When a
//! pending send is observed complete, the channel falls through and issues
//! the next send in the same poll, so migration never needs an idle gap
//! tick between fragments.

use crate::transport::{Fabric, Probe, SendTicket};
use atoll_core::{AtollError, AtollResult, IslandId, Topology};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{debug, warn};

/// Outcome of one emigration poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmigrationPoll {
    /// A fresh fragment was handed to the transport.
    Dispatched,
    /// The previous send is still in flight; nothing new was issued.
    Pending,
    /// The in-flight send failed; the channel retries with a newly drawn
    /// peer on the next poll.
    Faulted,
}

/// Sending half of an island's migration channel.
pub struct Emigration {
    topology: Topology,
    buffer: Vec<u8>,
    inflight: Option<SendTicket>,
    rng: SmallRng,
    dispatched: u64,
    last_peer: Option<IslandId>,
}

impl std::fmt::Debug for Emigration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emigration")
            .field("topology", &self.topology)
            .field("inflight", &self.inflight)
            .field("dispatched", &self.dispatched)
            .field("last_peer", &self.last_peer)
            .finish_non_exhaustive()
    }
}

impl Emigration {
    /// Create an emigration channel with an entropy-seeded peer selector.
    pub fn new(topology: Topology, fragment_size: usize) -> AtollResult<Self> {
        Self::with_rng(topology, fragment_size, SmallRng::from_rng(&mut rand::rng()))
    }

    /// Create an emigration channel with a deterministic peer selector.
    pub fn with_seed(topology: Topology, fragment_size: usize, seed: u64) -> AtollResult<Self> {
        Self::with_rng(topology, fragment_size, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(topology: Topology, fragment_size: usize, rng: SmallRng) -> AtollResult<Self> {
        if topology.is_sole_island() {
            return Err(AtollError::SoleIsland);
        }
        if fragment_size == 0 {
            return Err(AtollError::ZeroFragmentSize);
        }
        Ok(Self {
            topology,
            buffer: vec![0; fragment_size],
            inflight: None,
            rng,
            dispatched: 0,
            last_peer: None,
        })
    }

    /// Drive the channel one step. Never blocks.
    ///
    /// While a send is outstanding the channel only probes it; the
    /// producer is not invoked and no new send is issued. Once the
    /// outstanding send completes — in this poll or an earlier one — a
    /// peer is drawn, `on_send_ready` fills the buffer, and a new send
    /// goes out.
    ///
    /// A failed send is logged and absorbed: the channel reports
    /// [`EmigrationPoll::Faulted`] and stays idle until the next poll,
    /// which draws a fresh peer.
    pub fn poll<F, P>(&mut self, fabric: &F, on_send_ready: P) -> AtollResult<EmigrationPoll>
    where
        F: Fabric + ?Sized,
        P: FnOnce(&mut [u8]),
    {
        if let Some(ticket) = self.inflight.take() {
            match fabric.poll_send(&ticket)? {
                Probe::Pending => {
                    self.inflight = Some(ticket);
                    return Ok(EmigrationPoll::Pending);
                }
                Probe::Complete => {
                    debug!("send op {} completed", ticket.id());
                    // Fall through and issue the next send now.
                }
                Probe::Failed(reason) => {
                    warn!("send op {} failed: {}", ticket.id(), reason);
                    return Ok(EmigrationPoll::Faulted);
                }
            }
        }

        let peer = self.topology.random_peer(&mut self.rng)?;
        on_send_ready(&mut self.buffer);
        let ticket = fabric.begin_send(peer, &self.buffer)?;
        debug!("send op {} dispatched {} bytes to {}", ticket.id(), self.buffer.len(), peer);
        self.inflight = Some(ticket);
        self.last_peer = Some(peer);
        self.dispatched += 1;
        Ok(EmigrationPoll::Dispatched)
    }

    /// Whether a send is currently outstanding.
    pub fn is_sending(&self) -> bool {
        self.inflight.is_some()
    }

    /// Fixed fragment size this channel was built for.
    pub fn fragment_size(&self) -> usize {
        self.buffer.len()
    }

    /// Number of fragments handed to the transport so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Peer of the most recently issued send, if any.
    pub fn last_peer(&self) -> Option<IslandId> {
        self.last_peer
    }

    /// Cancel any outstanding send ahead of shutdown.
    pub fn shutdown<F>(&mut self, fabric: &F) -> AtollResult<()>
    where
        F: Fabric + ?Sized,
    {
        if let Some(ticket) = self.inflight.take() {
            debug!("cancelling send op {}", ticket.id());
            fabric.cancel_send(ticket)?;
        }
        Ok(())
    }
}
