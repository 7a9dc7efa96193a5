//! The communication substrate the quiescence core is built on.
//!
//! The core needs only a handful of primitives: a group-wide sum, tagged
//! point-to-point messages that can be posted without blocking and awaited as
//! a batch, and one region per process that peers can read one-sidedly.
//! Anything that offers these (an MPI binding, a shared-memory transport, the
//! in-process [`local`] group) can drive discovery and clock propagation.

pub mod local;

use crate::clock::ClockCell;
use crate::clock::ClockRecord;
use crate::error::CommError;
use crate::rank::Rank;
use crate::rank::Slot;
use crate::rank::Source;
use crate::rank::Tag;

/// The outcome of one request in a batch passed to [`Comm::wait_all`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// A posted send finished.
    Sent,
    /// A posted receive matched a message.
    Received { from: Rank, value: i64 },
}

impl Completion {
    /// The payload, if this completion is a receive.
    #[inline]
    pub fn value(&self) -> Option<i64> {
        return match self {
            Completion::Sent => None,
            Completion::Received { value, .. } => Some(*value),
        };
    }
}

/// The owner's view of its remotely readable clock region.
pub trait ClockRegion {
    /// The records, indexed by successor slot.
    fn cells(&self) -> &[ClockCell];
}

/// A process's endpoint into its group.
///
/// Every method is called by exactly one thread of control per process.
/// `reduce_sum_all`, `barrier`, `alloc_remote_readable` and
/// `free_remote_readable` are collective: every process in the group must call
/// them, in the same order.
pub trait Comm {
    /// Handle to a posted, not yet awaited, send or receive.
    type Request;

    /// Handle to this process's remotely readable region.
    type Region: ClockRegion;

    /// Number of processes in the group.
    fn group_size(&self) -> usize;

    /// This process's rank.
    fn rank(&self) -> Rank;

    /// Element-wise sum of every process's `values`, delivered to all.
    fn reduce_sum_all(&mut self, values: &[i64]) -> Result<Vec<i64>, CommError>;

    /// Post a send of `value` to `dest` without waiting for it.
    fn post_send(&mut self, dest: Rank, tag: Tag, value: i64) -> Result<Self::Request, CommError>;

    /// Post a receive without waiting for it.
    fn post_recv(&mut self, source: Source, tag: Tag) -> Result<Self::Request, CommError>;

    /// Wait for every request in the batch. Completions come back in the
    /// order the requests were given.
    fn wait_all(&mut self, requests: Vec<Self::Request>) -> Result<Vec<Completion>, CommError>;

    /// Block until every process has reached the barrier.
    fn barrier(&mut self) -> Result<(), CommError>;

    /// Allocate this process's zeroed region of `records` clock cells.
    ///
    /// Returns only once every process has allocated, so peers may read
    /// straight away.
    fn alloc_remote_readable(&mut self, records: usize) -> Result<Self::Region, CommError>;

    /// Queue a one-sided read of record `slot` in `owner`'s region.
    fn get(&mut self, owner: Rank, slot: Slot) -> Result<(), CommError>;

    /// Complete every queued read, returning the records in issue order.
    fn flush_local(&mut self) -> Result<Vec<ClockRecord>, CommError>;

    /// Release this process's region once no peer will read it again.
    fn free_remote_readable(&mut self, region: Self::Region) -> Result<(), CommError>;
}
