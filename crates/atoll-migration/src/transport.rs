//! The point-to-point messaging substrate behind the migration channels.
//!
//! The channels never talk to a transport directly; they drive whatever
//! implements [`Fabric`], the narrow non-blocking interface below. A
//! fabric hands out owned tickets for in-flight operations and classifies
//! every probe as pending, complete, or failed — failure is a distinct
//! terminal outcome, not something folded into "not yet".

use atoll_core::{AtollResult, IslandId};

/// Result of probing an in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Not complete yet; probe again on a later tick.
    Pending,
    /// The operation finished.
    Complete,
    /// The operation can never finish (dead peer, broken link,
    /// malformed fragment). Carries a human-readable reason.
    Failed(String),
}

impl Probe {
    /// Whether this probe is a terminal outcome (complete or failed).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Probe::Pending)
    }
}

/// Owned handle to an in-flight receive.
///
/// A ticket is spent when the fabric reports a terminal probe for it or
/// when it is cancelled; polling a spent ticket is a transport error.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct RecvTicket(pub(crate) u64);

impl RecvTicket {
    /// The fabric-assigned operation id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Owned handle to an in-flight send.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SendTicket(pub(crate) u64);

impl SendTicket {
    /// The fabric-assigned operation id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// One island's endpoint on the messaging substrate.
///
/// All calls are non-blocking. Each ticket must be driven to a terminal
/// probe or cancelled exactly once; the fabric releases the operation's
/// resources at that point.
pub trait Fabric {
    /// Post a non-blocking receive for `size` bytes from any island.
    fn begin_recv(&self, size: usize) -> AtollResult<RecvTicket>;

    /// Probe an in-flight receive. On [`Probe::Complete`] the payload has
    /// been copied into `buf` and the ticket is spent.
    fn poll_recv(&self, ticket: &RecvTicket, buf: &mut [u8]) -> AtollResult<Probe>;

    /// Start a non-blocking send of `buf` to `dest`.
    fn begin_send(&self, dest: IslandId, buf: &[u8]) -> AtollResult<SendTicket>;

    /// Probe an in-flight send. On a terminal probe the ticket is spent.
    fn poll_send(&self, ticket: &SendTicket) -> AtollResult<Probe>;

    /// Abandon an in-flight receive. Shutdown path: lets a process tear
    /// down without waiting on a receive that may never complete.
    fn cancel_recv(&self, ticket: RecvTicket) -> AtollResult<()>;

    /// Abandon an in-flight send.
    fn cancel_send(&self, ticket: SendTicket) -> AtollResult<()>;
}
