//! Immigration channel — the receiving half of migration.
//!
//! An island polls this channel once per generation (or on whatever
//! cadence it exchanges individuals). The channel keeps at most one
//! receive outstanding: when idle it posts a fresh receive, and while one
//! is outstanding it probes without blocking. A completed fragment is
//! handed to the caller's consumer before the channel returns to idle.

use crate::transport::{Fabric, Probe, RecvTicket};
use atoll_core::{AtollError, AtollResult, Topology};
use tracing::{debug, warn};

/// Outcome of one immigration poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmigrationPoll {
    /// A receive was posted; nothing has arrived yet.
    Armed,
    /// The posted receive is still waiting for a fragment.
    Pending,
    /// A fragment arrived and was handed to the consumer.
    Delivered,
    /// The in-flight receive failed; the channel re-arms on the next poll.
    Faulted,
}

/// Receiving half of an island's migration channel.
///
/// Owns the fragment buffer for the lifetime of the channel, so exclusive
/// access during an in-flight receive is structural: the consumer only
/// ever sees the buffer as a borrowed slice after a completed receive.
#[derive(Debug)]
pub struct Immigration {
    buffer: Vec<u8>,
    inflight: Option<RecvTicket>,
    delivered: u64,
}

impl Immigration {
    /// Create an immigration channel for fragments of `fragment_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `SoleIsland` for a single-island topology (migration is a
    /// configuration error there, caught before the loop starts) and
    /// `ZeroFragmentSize` for an empty fragment.
    pub fn new(topology: &Topology, fragment_size: usize) -> AtollResult<Self> {
        if topology.is_sole_island() {
            return Err(AtollError::SoleIsland);
        }
        if fragment_size == 0 {
            return Err(AtollError::ZeroFragmentSize);
        }
        Ok(Self {
            buffer: vec![0; fragment_size],
            inflight: None,
            delivered: 0,
        })
    }

    /// Drive the channel one step. Never blocks.
    ///
    /// Idle: zeroes the buffer and posts a receive from any island.
    /// Receiving: probes the outstanding receive; on completion the
    /// consumer is invoked exactly once with the arrived fragment, and the
    /// channel is idle again when this call returns.
    ///
    /// A failed receive is logged and absorbed — the channel returns
    /// [`ImmigrationPoll::Faulted`] and re-arms on the next poll, so a
    /// dead peer costs a generation's migration, not the process.
    pub fn poll<F, C>(&mut self, fabric: &F, on_received: C) -> AtollResult<ImmigrationPoll>
    where
        F: Fabric + ?Sized,
        C: FnOnce(&[u8]),
    {
        let ticket = match self.inflight.take() {
            None => {
                self.buffer.fill(0);
                let ticket = fabric.begin_recv(self.buffer.len())?;
                debug!("posted receive op {}", ticket.id());
                self.inflight = Some(ticket);
                return Ok(ImmigrationPoll::Armed);
            }
            Some(ticket) => ticket,
        };

        match fabric.poll_recv(&ticket, &mut self.buffer)? {
            Probe::Pending => {
                self.inflight = Some(ticket);
                Ok(ImmigrationPoll::Pending)
            }
            Probe::Complete => {
                debug!("receive op {} delivered {} bytes", ticket.id(), self.buffer.len());
                on_received(&self.buffer);
                self.delivered += 1;
                Ok(ImmigrationPoll::Delivered)
            }
            Probe::Failed(reason) => {
                warn!("receive op {} failed: {}", ticket.id(), reason);
                Ok(ImmigrationPoll::Faulted)
            }
        }
    }

    /// Whether a receive is currently outstanding.
    pub fn is_receiving(&self) -> bool {
        self.inflight.is_some()
    }

    /// Fixed fragment size this channel was built for.
    pub fn fragment_size(&self) -> usize {
        self.buffer.len()
    }

    /// Number of fragments delivered to the consumer so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Cancel any outstanding receive ahead of shutdown.
    pub fn shutdown<F>(&mut self, fabric: &F) -> AtollResult<()>
    where
        F: Fabric + ?Sized,
    {
        if let Some(ticket) = self.inflight.take() {
            debug!("cancelling receive op {}", ticket.id());
            fabric.cancel_recv(ticket)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFabric;
    use crate::transport::Fabric;
    use atoll_core::IslandId;

    fn two_island_topology() -> Topology {
        Topology::new(2, IslandId::new(1)).unwrap()
    }

    #[test]
    fn test_sole_island_rejected() {
        let topo = Topology::new(1, IslandId::new(0)).unwrap();
        assert_eq!(
            Immigration::new(&topo, 16).unwrap_err(),
            AtollError::SoleIsland
        );
    }

    #[test]
    fn test_zero_fragment_size_rejected() {
        assert_eq!(
            Immigration::new(&two_island_topology(), 0).unwrap_err(),
            AtollError::ZeroFragmentSize
        );
    }

    #[test]
    fn test_arm_then_pending_then_deliver() {
        let fabric = MemoryFabric::with_manual_delivery(2).unwrap();
        let sender = fabric.port(IslandId::new(0)).unwrap();
        let port = fabric.port(IslandId::new(1)).unwrap();

        let mut channel = Immigration::new(&two_island_topology(), 4).unwrap();
        let mut arrived: Option<Vec<u8>> = None;

        assert_eq!(
            channel.poll(&port, |_| panic!("nothing arrived yet")).unwrap(),
            ImmigrationPoll::Armed
        );
        assert!(channel.is_receiving());

        sender.begin_send(IslandId::new(1), &[7, 7, 7, 7]).unwrap();
        assert_eq!(
            channel.poll(&port, |_| panic!("still in transit")).unwrap(),
            ImmigrationPoll::Pending
        );

        fabric.deliver_all();
        assert_eq!(
            channel.poll(&port, |buf| arrived = Some(buf.to_vec())).unwrap(),
            ImmigrationPoll::Delivered
        );
        assert_eq!(arrived.unwrap(), vec![7, 7, 7, 7]);
        assert!(!channel.is_receiving());
        assert_eq!(channel.delivered(), 1);
    }

    #[test]
    fn test_buffer_zeroed_between_receives() {
        let fabric = MemoryFabric::new(2).unwrap();
        let sender = fabric.port(IslandId::new(0)).unwrap();
        let port = fabric.port(IslandId::new(1)).unwrap();

        let mut channel = Immigration::new(&two_island_topology(), 4).unwrap();

        sender.begin_send(IslandId::new(1), &[0xFF; 4]).unwrap();
        channel.poll(&port, |_| {}).unwrap();
        channel.poll(&port, |_| {}).unwrap();

        // Re-arm: the fabric sees a fresh receive and the old payload is
        // not visible to the next consumer.
        assert_eq!(channel.poll(&port, |_| {}).unwrap(), ImmigrationPoll::Armed);
        sender.begin_send(IslandId::new(1), &[1, 0, 0, 1]).unwrap();
        let mut seen = Vec::new();
        channel.poll(&port, |buf| seen = buf.to_vec()).unwrap();
        assert_eq!(seen, vec![1, 0, 0, 1]);
    }

    #[test]
    fn test_failed_receive_faults_and_rearms() {
        let fabric = MemoryFabric::new(2).unwrap();
        let sender = fabric.port(IslandId::new(0)).unwrap();
        let port = fabric.port(IslandId::new(1)).unwrap();

        let mut channel = Immigration::new(&two_island_topology(), 4).unwrap();
        assert_eq!(channel.poll(&port, |_| {}).unwrap(), ImmigrationPoll::Armed);

        // Wrong-size fragment arrives: the probe fails.
        sender.begin_send(IslandId::new(1), &[1, 2]).unwrap();
        assert_eq!(
            channel.poll(&port, |_| panic!("must not deliver")).unwrap(),
            ImmigrationPoll::Faulted
        );
        assert!(!channel.is_receiving());
        assert_eq!(channel.delivered(), 0);

        // Next poll re-arms as if nothing happened.
        assert_eq!(channel.poll(&port, |_| {}).unwrap(), ImmigrationPoll::Armed);
    }

    #[test]
    fn test_single_flight_across_many_ticks() {
        let fabric = MemoryFabric::with_manual_delivery(2).unwrap();
        let port = fabric.port(IslandId::new(1)).unwrap();

        let mut channel = Immigration::new(&two_island_topology(), 8).unwrap();
        channel.poll(&port, |_| {}).unwrap();
        for _ in 0..100 {
            assert_eq!(channel.poll(&port, |_| {}).unwrap(), ImmigrationPoll::Pending);
            assert_eq!(fabric.outstanding_ops(), 1);
        }
    }

    #[test]
    fn test_shutdown_cancels_inflight() {
        let fabric = MemoryFabric::new(2).unwrap();
        let port = fabric.port(IslandId::new(1)).unwrap();

        let mut channel = Immigration::new(&two_island_topology(), 8).unwrap();
        channel.poll(&port, |_| {}).unwrap();
        assert_eq!(fabric.outstanding_ops(), 1);

        channel.shutdown(&port).unwrap();
        assert!(!channel.is_receiving());
        assert_eq!(fabric.outstanding_ops(), 0);

        // Idempotent when nothing is outstanding.
        channel.shutdown(&port).unwrap();
    }
}
