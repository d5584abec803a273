//! In-process memory fabric.
//!
//! Backs tests and single-process archipelago simulations with a real
//! [`Fabric`] implementation. All islands share one fabric; each island
//! drives its own [`MemoryPort`] endpoint.
//!
//! Two delivery modes:
//!
//! - **auto** ([`MemoryFabric::new`]): a send is placed in the destination
//!   inbox the moment it is issued, matching a buffered non-blocking send
//!   that completes as soon as the source buffer is reusable.
//! - **manual** ([`MemoryFabric::with_manual_delivery`]): parcels sit in
//!   transit until [`MemoryFabric::deliver_all`] is called, so a test can
//!   hold a send or receive in its pending window and observe it there.

use crate::transport::{Fabric, Probe, RecvTicket, SendTicket};
use atoll_core::{AtollError, AtollResult, IslandId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// A fragment moving between two islands.
struct Parcel {
    source: IslandId,
    dest: IslandId,
    payload: Vec<u8>,
    /// The send operation this parcel belongs to.
    send_op: u64,
}

/// An outstanding receive posted by an island.
struct RecvOp {
    island: IslandId,
    size: usize,
}

/// Progress of an outstanding send.
enum SendState {
    InTransit,
    Delivered,
    Failed(String),
}

struct FabricState {
    island_count: u32,
    auto_deliver: bool,
    next_op: u64,
    /// Parcels issued but not yet delivered (manual mode only).
    in_transit: VecDeque<Parcel>,
    /// Arrived parcels awaiting a matching receive, per island.
    inboxes: Vec<VecDeque<Parcel>>,
    recvs: HashMap<u64, RecvOp>,
    sends: HashMap<u64, SendState>,
    offline: HashSet<IslandId>,
}

impl FabricState {
    fn next_op(&mut self) -> u64 {
        let op = self.next_op;
        self.next_op += 1;
        op
    }

    fn check_island(&self, island: IslandId) -> AtollResult<()> {
        if island.as_u32() >= self.island_count {
            return Err(AtollError::UnknownIsland(island));
        }
        Ok(())
    }

    /// Move one parcel to its destination inbox, or fail its send if the
    /// destination is offline.
    fn route(&mut self, parcel: Parcel) {
        if self.offline.contains(&parcel.dest) {
            let reason = format!("{} is offline", parcel.dest);
            if let Some(state) = self.sends.get_mut(&parcel.send_op) {
                *state = SendState::Failed(reason);
            }
            return;
        }
        if let Some(state) = self.sends.get_mut(&parcel.send_op) {
            *state = SendState::Delivered;
        }
        debug!(
            "delivered {} byte parcel {} -> {}",
            parcel.payload.len(),
            parcel.source,
            parcel.dest
        );
        self.inboxes[parcel.dest.as_u32() as usize].push_back(parcel);
    }
}

type Shared = Arc<Mutex<FabricState>>;

/// Lock the shared state, recovering from a poisoned lock. The state is
/// plain data, so a panicked holder cannot leave it half-updated in any
/// way the fabric cares about.
fn lock(shared: &Shared) -> MutexGuard<'_, FabricState> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-process messaging substrate shared by all islands of a simulation.
pub struct MemoryFabric {
    inner: Shared,
}

impl MemoryFabric {
    /// Create a fabric with automatic delivery.
    pub fn new(island_count: u32) -> AtollResult<Self> {
        Self::build(island_count, true)
    }

    /// Create a fabric that holds parcels in transit until
    /// [`deliver_all`](Self::deliver_all) is called.
    pub fn with_manual_delivery(island_count: u32) -> AtollResult<Self> {
        Self::build(island_count, false)
    }

    fn build(island_count: u32, auto_deliver: bool) -> AtollResult<Self> {
        if island_count < 1 {
            return Err(AtollError::EmptyTopology);
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(FabricState {
                island_count,
                auto_deliver,
                next_op: 0,
                in_transit: VecDeque::new(),
                inboxes: (0..island_count).map(|_| VecDeque::new()).collect(),
                recvs: HashMap::new(),
                sends: HashMap::new(),
                offline: HashSet::new(),
            })),
        })
    }

    /// Get the endpoint for one island.
    pub fn port(&self, island: IslandId) -> AtollResult<MemoryPort> {
        lock(&self.inner).check_island(island)?;
        Ok(MemoryPort {
            island,
            inner: self.inner.clone(),
        })
    }

    /// Deliver every parcel currently in transit (manual mode).
    /// Returns the number of parcels routed.
    pub fn deliver_all(&self) -> usize {
        let mut state = lock(&self.inner);
        let parcels: Vec<Parcel> = state.in_transit.drain(..).collect();
        let routed = parcels.len();
        for parcel in parcels {
            state.route(parcel);
        }
        routed
    }

    /// Number of parcels issued but not yet delivered.
    pub fn in_transit_count(&self) -> usize {
        lock(&self.inner).in_transit.len()
    }

    /// Mark an island unreachable. Parcels routed toward it fail their
    /// sends instead of arriving.
    pub fn set_offline(&self, island: IslandId) -> AtollResult<()> {
        let mut state = lock(&self.inner);
        state.check_island(island)?;
        state.offline.insert(island);
        Ok(())
    }

    /// Mark an island reachable again.
    pub fn set_online(&self, island: IslandId) -> AtollResult<()> {
        let mut state = lock(&self.inner);
        state.check_island(island)?;
        state.offline.remove(&island);
        Ok(())
    }

    /// Total outstanding operations (unspent tickets) across all islands.
    pub fn outstanding_ops(&self) -> usize {
        let state = lock(&self.inner);
        state.recvs.len() + state.sends.len()
    }
}

/// One island's endpoint on a [`MemoryFabric`].
#[derive(Clone)]
pub struct MemoryPort {
    island: IslandId,
    inner: Shared,
}

impl MemoryPort {
    /// The island this port belongs to.
    pub fn island(&self) -> IslandId {
        self.island
    }
}

impl std::fmt::Debug for MemoryPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPort")
            .field("island", &self.island)
            .finish_non_exhaustive()
    }
}

impl Fabric for MemoryPort {
    fn begin_recv(&self, size: usize) -> AtollResult<RecvTicket> {
        if size == 0 {
            return Err(AtollError::ZeroFragmentSize);
        }
        let mut state = lock(&self.inner);
        let op = state.next_op();
        state.recvs.insert(
            op,
            RecvOp {
                island: self.island,
                size,
            },
        );
        Ok(RecvTicket(op))
    }

    fn poll_recv(&self, ticket: &RecvTicket, buf: &mut [u8]) -> AtollResult<Probe> {
        let mut state = lock(&self.inner);
        let (size, island) = match state.recvs.get(&ticket.0) {
            Some(op) => (op.size, op.island),
            None => {
                return Err(AtollError::Transport(format!(
                    "unknown or spent recv ticket {}",
                    ticket.0
                )))
            }
        };
        if buf.len() != size {
            return Err(AtollError::FragmentSizeMismatch {
                expected: size,
                actual: buf.len(),
            });
        }

        let parcel = match state.inboxes[island.as_u32() as usize].pop_front() {
            Some(parcel) => parcel,
            None => return Ok(Probe::Pending),
        };
        state.recvs.remove(&ticket.0);

        if parcel.payload.len() != size {
            return Ok(Probe::Failed(format!(
                "fragment size mismatch: posted {} bytes, {} sent {}",
                size,
                parcel.source,
                parcel.payload.len()
            )));
        }
        buf.copy_from_slice(&parcel.payload);
        Ok(Probe::Complete)
    }

    fn begin_send(&self, dest: IslandId, buf: &[u8]) -> AtollResult<SendTicket> {
        if buf.is_empty() {
            return Err(AtollError::ZeroFragmentSize);
        }
        let mut state = lock(&self.inner);
        state.check_island(dest)?;
        let op = state.next_op();
        state.sends.insert(op, SendState::InTransit);
        let parcel = Parcel {
            source: self.island,
            dest,
            payload: buf.to_vec(),
            send_op: op,
        };
        if state.auto_deliver {
            state.route(parcel);
        } else {
            state.in_transit.push_back(parcel);
        }
        Ok(SendTicket(op))
    }

    fn poll_send(&self, ticket: &SendTicket) -> AtollResult<Probe> {
        let mut state = lock(&self.inner);
        match state.sends.remove(&ticket.0) {
            Some(SendState::InTransit) => {
                state.sends.insert(ticket.0, SendState::InTransit);
                Ok(Probe::Pending)
            }
            Some(SendState::Delivered) => Ok(Probe::Complete),
            Some(SendState::Failed(reason)) => Ok(Probe::Failed(reason)),
            None => Err(AtollError::Transport(format!(
                "unknown or spent send ticket {}",
                ticket.0
            ))),
        }
    }

    fn cancel_recv(&self, ticket: RecvTicket) -> AtollResult<()> {
        let mut state = lock(&self.inner);
        if state.recvs.remove(&ticket.0).is_none() {
            return Err(AtollError::Transport(format!(
                "unknown or spent recv ticket {}",
                ticket.0
            )));
        }
        Ok(())
    }

    fn cancel_send(&self, ticket: SendTicket) -> AtollResult<()> {
        let mut state = lock(&self.inner);
        if state.sends.remove(&ticket.0).is_none() {
            return Err(AtollError::Transport(format!(
                "unknown or spent send ticket {}",
                ticket.0
            )));
        }
        // An in-transit parcel for a cancelled send may still arrive;
        // the fabric just no longer reports on it.
        Ok(())
    }
}
