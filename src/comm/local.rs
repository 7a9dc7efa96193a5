//! An in-process process group, one endpoint per thread.
//!
//! Point-to-point traffic flows through one `crossbeam-channel` mailbox per
//! rank. Every send is buffered, so posting never blocks; receives are matched
//! when awaited, and arrivals that do not match the receive being awaited are
//! parked until one does. Messages from one sender to one receiver are never
//! reordered.
//!
//! When a rank's body panics under [`LocalGroup::run`], the group is torn
//! down: every endpoint blocked in a collective or a receive wakes up with
//! [`CommError::Disconnected`] instead of waiting for a peer that is gone.
//!
//! Regions live in a table shared by the whole group, so a `get` is a plain
//! atomic load of the owner's cell and needs nothing from the owner.
//!
//! ```
//! use quiesce::comm::Comm;
//! use quiesce::comm::local::LocalGroup;
//!
//! let sums = LocalGroup::run(3, |mut comm| comm.reduce_sum_all(&[1, 2]).unwrap());
//! for sum in sums {
//!     assert_eq!(sum, vec![3, 6]);
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::Sender;
use parking_lot::Condvar;
use parking_lot::Mutex;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::clock::ClockCell;
use crate::clock::ClockRecord;
use crate::comm::ClockRegion;
use crate::comm::Comm;
use crate::comm::Completion;
use crate::error::CommError;
use crate::rank::Rank;
use crate::rank::Slot;
use crate::rank::Source;
use crate::rank::Tag;

/// How often a blocked receive checks whether the group was torn down.
const ABORT_POLL: Duration = Duration::from_millis(10);

/// Marker in [`Shared::aborted_by`] for a group that is still whole.
const NOT_ABORTED: usize = usize::MAX;

/// A message in flight between two endpoints.
#[derive(Clone, Copy, Debug)]
struct Envelope {
    from: Rank,
    tag: Tag,
    value: i64,
}

/// Accumulator for one reduction round.
struct ReduceRound {
    generation: u64,
    arrived: usize,
    sum: Vec<i64>,
    result: Vec<i64>,
}

struct BarrierRound {
    generation: u64,
    arrived: usize,
}

/// State every endpoint of a group shares.
struct Shared {
    size: usize,
    reduce: Mutex<ReduceRound>,
    reduce_done: Condvar,
    barrier: Mutex<BarrierRound>,
    barrier_done: Condvar,
    regions: RwLock<Vec<Option<Arc<[ClockCell]>>>>,
    /// First rank whose body unwound, or [`NOT_ABORTED`].
    aborted_by: AtomicUsize,
}

impl Shared {
    fn is_aborted(&self) -> bool {
        return self.aborted_by.load(Ordering::Acquire) != NOT_ABORTED;
    }

    /// Tear the group down on behalf of `rank` and wake every waiter.
    fn abort(&self, rank: Rank) {
        let _ = self.aborted_by.compare_exchange(
            NOT_ABORTED,
            rank.index(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        // Passing through each lock orders the flag before any waiter's next
        // check, so no waiter can miss the wakeup.
        drop(self.reduce.lock());
        self.reduce_done.notify_all();
        drop(self.barrier.lock());
        self.barrier_done.notify_all();
    }

    fn first_aborted(&self) -> Option<usize> {
        let rank = self.aborted_by.load(Ordering::Acquire);
        return (rank != NOT_ABORTED).then_some(rank);
    }
}

/// Aborts the group if dropped while its rank's body is unwinding.
struct AbortOnUnwind {
    shared: Arc<Shared>,
    rank: Rank,
}

impl Drop for AbortOnUnwind {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.abort(self.rank);
        }
    }
}

/// Builder for a connected set of [`LocalComm`] endpoints.
pub struct LocalGroup;

impl LocalGroup {
    /// Create `size` endpoints, index `r` having rank `r`.
    pub fn new(size: usize) -> Vec<LocalComm> {
        let shared = Arc::new(Shared {
            size,
            reduce: Mutex::new(ReduceRound {
                generation: 0,
                arrived: 0,
                sum: Vec::new(),
                result: Vec::new(),
            }),
            reduce_done: Condvar::new(),
            barrier: Mutex::new(BarrierRound { generation: 0, arrived: 0 }),
            barrier_done: Condvar::new(),
            regions: RwLock::new(vec![None; size]),
            aborted_by: AtomicUsize::new(NOT_ABORTED),
        });

        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

        return receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalComm {
                rank: Rank(rank as u32),
                shared: shared.clone(),
                peers: senders.clone(),
                inbox,
                parked: VecDeque::new(),
                pending_reads: SmallVec::new(),
                sent: 0,
            })
            .collect();
    }

    /// Run `body` once per rank of a fresh group of `size`, each on its own
    /// thread, and return the results in rank order.
    ///
    /// A panic on any rank tears the group down, so peers blocked on it see
    /// [`CommError::Disconnected`], and the first rank's panic is re-raised
    /// on the caller once every thread has finished.
    pub fn run<T, F>(size: usize, body: F) -> Vec<T>
    where
        T: Send,
        F: Fn(LocalComm) -> T + Sync,
    {
        let endpoints = LocalGroup::new(size);
        let Some(shared) = endpoints.first().map(|comm| comm.shared.clone()) else {
            return Vec::new();
        };

        let mut outcomes: Vec<thread::Result<T>> = thread::scope(|scope| {
            let handles: Vec<_> = endpoints
                .into_iter()
                .map(|comm| {
                    let body = &body;
                    scope.spawn(move || {
                        let _guard = AbortOnUnwind {
                            shared: comm.shared.clone(),
                            rank: comm.rank,
                        };
                        return body(comm);
                    })
                })
                .collect();
            return handles.into_iter().map(|handle| handle.join()).collect();
        });

        if let Some(first) = shared.first_aborted() {
            if let Err(payload) = outcomes.swap_remove(first) {
                std::panic::resume_unwind(payload);
            }
        }
        return outcomes
            .into_iter()
            .map(|outcome| match outcome {
                Ok(value) => value,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect();
    }
}

/// A posted operation on a [`LocalComm`]. Sends are already delivered.
#[derive(Debug)]
pub enum LocalRequest {
    Send,
    Recv { source: Source, tag: Tag },
}

/// An endpoint's handle on its own region.
#[derive(Debug)]
pub struct LocalRegion {
    cells: Arc<[ClockCell]>,
}

impl ClockRegion for LocalRegion {
    fn cells(&self) -> &[ClockCell] {
        return &self.cells;
    }
}

/// One rank's endpoint into a [`LocalGroup`].
pub struct LocalComm {
    rank: Rank,
    shared: Arc<Shared>,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    /// Arrivals not yet matched by any awaited receive, oldest first.
    parked: VecDeque<Envelope>,
    pending_reads: SmallVec<[(Rank, Slot); 8]>,
    sent: u64,
}

impl LocalComm {
    /// Point-to-point messages this endpoint has sent.
    pub fn sent_count(&self) -> u64 {
        return self.sent;
    }

    /// Messages delivered to this endpoint that no receive has taken yet.
    pub fn pending_count(&self) -> usize {
        return self.parked.len() + self.inbox.len();
    }

    fn check_rank(&self, rank: Rank) -> Result<(), CommError> {
        if rank.index() >= self.shared.size {
            return Err(CommError::InvalidRank {
                rank,
                group_size: self.shared.size,
            });
        }
        return Ok(());
    }

    /// Take the oldest message satisfying `source` and `tag`, blocking until
    /// one arrives.
    fn take_matching(&mut self, source: Source, tag: Tag) -> Result<Envelope, CommError> {
        let parked = self
            .parked
            .iter()
            .position(|envelope| envelope.tag == tag && source.accepts(envelope.from));
        if let Some(position) = parked {
            if let Some(envelope) = self.parked.remove(position) {
                return Ok(envelope);
            }
        }

        loop {
            let envelope = match self.inbox.recv_timeout(ABORT_POLL) {
                Ok(envelope) => envelope,
                Err(RecvTimeoutError::Timeout) if self.shared.is_aborted() => {
                    return Err(CommError::Disconnected);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(CommError::Disconnected),
            };
            if envelope.tag == tag && source.accepts(envelope.from) {
                return Ok(envelope);
            }
            self.parked.push_back(envelope);
        }
    }

    fn read_cell(&self, owner: Rank, slot: Slot) -> Result<ClockRecord, CommError> {
        let regions = self.shared.regions.read();
        let cells = regions[owner.index()]
            .as_ref()
            .ok_or(CommError::NoRegion(owner))?;
        let cell = cells.get(slot.index()).ok_or(CommError::SlotOutOfBounds {
            owner,
            slot,
            len: cells.len(),
        })?;
        return Ok(cell.load());
    }
}

impl Comm for LocalComm {
    type Request = LocalRequest;
    type Region = LocalRegion;

    fn group_size(&self) -> usize {
        return self.shared.size;
    }

    fn rank(&self) -> Rank {
        return self.rank;
    }

    fn reduce_sum_all(&mut self, values: &[i64]) -> Result<Vec<i64>, CommError> {
        let shared = &self.shared;
        let mut round = shared.reduce.lock();
        if shared.is_aborted() {
            return Err(CommError::Disconnected);
        }

        if round.arrived == 0 {
            round.sum = vec![0; values.len()];
        } else if round.sum.len() != values.len() {
            return Err(CommError::LengthMismatch {
                expected: round.sum.len(),
                actual: values.len(),
            });
        }

        for (total, value) in round.sum.iter_mut().zip(values) {
            *total += *value;
        }
        round.arrived += 1;

        if round.arrived == shared.size {
            round.result = std::mem::take(&mut round.sum);
            round.arrived = 0;
            round.generation += 1;
            shared.reduce_done.notify_all();
            return Ok(round.result.clone());
        }

        let generation = round.generation;
        while round.generation == generation {
            if shared.is_aborted() {
                return Err(CommError::Disconnected);
            }
            shared.reduce_done.wait(&mut round);
        }
        return Ok(round.result.clone());
    }

    fn post_send(&mut self, dest: Rank, tag: Tag, value: i64) -> Result<LocalRequest, CommError> {
        self.check_rank(dest)?;
        let envelope = Envelope {
            from: self.rank,
            tag,
            value,
        };
        self.peers[dest.index()]
            .send(envelope)
            .map_err(|_| CommError::Disconnected)?;
        self.sent += 1;
        return Ok(LocalRequest::Send);
    }

    fn post_recv(&mut self, source: Source, tag: Tag) -> Result<LocalRequest, CommError> {
        if let Source::Rank(rank) = source {
            self.check_rank(rank)?;
        }
        return Ok(LocalRequest::Recv { source, tag });
    }

    fn wait_all(&mut self, requests: Vec<LocalRequest>) -> Result<Vec<Completion>, CommError> {
        let mut completions = Vec::with_capacity(requests.len());
        for request in requests {
            let completion = match request {
                LocalRequest::Send => Completion::Sent,
                LocalRequest::Recv { source, tag } => {
                    let envelope = self.take_matching(source, tag)?;
                    Completion::Received {
                        from: envelope.from,
                        value: envelope.value,
                    }
                }
            };
            completions.push(completion);
        }
        return Ok(completions);
    }

    fn barrier(&mut self) -> Result<(), CommError> {
        let shared = &self.shared;
        let mut round = shared.barrier.lock();
        if shared.is_aborted() {
            return Err(CommError::Disconnected);
        }
        round.arrived += 1;
        if round.arrived == shared.size {
            round.arrived = 0;
            round.generation += 1;
            shared.barrier_done.notify_all();
            return Ok(());
        }

        let generation = round.generation;
        while round.generation == generation {
            if shared.is_aborted() {
                return Err(CommError::Disconnected);
            }
            shared.barrier_done.wait(&mut round);
        }
        return Ok(());
    }

    fn alloc_remote_readable(&mut self, records: usize) -> Result<LocalRegion, CommError> {
        let cells: Arc<[ClockCell]> = (0..records).map(|_| ClockCell::new()).collect();
        {
            let mut regions = self.shared.regions.write();
            let entry = &mut regions[self.rank.index()];
            if entry.is_some() {
                return Err(CommError::RegionExists(self.rank));
            }
            *entry = Some(cells.clone());
        }
        self.barrier()?;
        return Ok(LocalRegion { cells });
    }

    fn get(&mut self, owner: Rank, slot: Slot) -> Result<(), CommError> {
        self.check_rank(owner)?;
        self.pending_reads.push((owner, slot));
        return Ok(());
    }

    fn flush_local(&mut self) -> Result<Vec<ClockRecord>, CommError> {
        let pending = std::mem::take(&mut self.pending_reads);
        return pending
            .into_iter()
            .map(|(owner, slot)| self.read_cell(owner, slot))
            .collect();
    }

    fn free_remote_readable(&mut self, region: LocalRegion) -> Result<(), CommError> {
        self.barrier()?;
        let mut regions = self.shared.regions.write();
        let entry = &mut regions[self.rank.index()];
        let owned = matches!(entry, Some(cells) if Arc::ptr_eq(cells, &region.cells));
        if !owned {
            return Err(CommError::NoRegion(self.rank));
        }
        *entry = None;
        return Ok(());
    }
}
