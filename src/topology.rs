//! Topology discovery.
//!
//! Every process knows only whom it receives from (its predecessors). To let
//! predecessors publish per-reader counters, each process must also learn who
//! reads from it (its successors) and agree with each of them on a slot in
//! its clock store. Discovery is collective and runs once:
//!
//! 1. Fan-out count: every process contributes an indicator vector with a 1
//!    at each predecessor's rank. The group-wide sum at index `r` is the
//!    number of successors rank `r` has.
//! 2. Identity exchange: each process sends its rank to each predecessor and
//!    receives one rank from any source per expected successor. Sends and
//!    receives are posted together and awaited as one batch, so partial
//!    topologies cannot deadlock.
//! 3. Ordering: received successor ranks are sorted ascending. Arrival order
//!    depends on timing; after the sort nothing downstream does.
//! 4. Index replay: successor `i` in sorted order owns slot `i`; each process
//!    tells every successor its slot and learns, from each predecessor, the
//!    slot that predecessor reserved for it.
//!
//! A process with no predecessors posts no sends, and one with no successors
//! posts no receives, so isolated processes take part only in the reduction.

use rustc_hash::FxHashMap;
use tracing::debug;
use tracing::error;

use crate::comm::Comm;
use crate::comm::Completion;
use crate::config::Config;
use crate::error::CommError;
use crate::error::Error;
use crate::error::Phase;
use crate::rank::Rank;
use crate::rank::Slot;
use crate::rank::Source;

/// Domain separator for [`Topology::digest`].
const DIGEST_CONTEXT: &[u8] = b"quiesce topology v1";

/// The discovered communication neighbourhood of one process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    rank: Rank,
    group_size: usize,
    /// Predecessors in the order the caller listed them.
    pred_ranks: Vec<Rank>,
    /// For each predecessor, the slot on its store reserved for this process.
    pred_slots: Vec<Slot>,
    /// Successors, ascending. Position `i` owns slot `i`.
    succ_ranks: Vec<Rank>,
    pred_lookup: FxHashMap<Rank, usize>,
    succ_lookup: FxHashMap<Rank, Slot>,
}

impl Topology {
    /// Run the collective discovery protocol.
    ///
    /// Every process in the group must call this, each with its own
    /// predecessor list. Invalid input is rejected before any collective
    /// traffic; a failure after that point leaves the group unusable.
    pub fn discover<C: Comm>(comm: &mut C, pred_ranks: &[Rank], config: &Config) -> Result<Topology, Error> {
        config.validate()?;
        let rank = comm.rank();
        let group_size = comm.group_size();
        let pred_lookup = index_predecessors(pred_ranks, group_size)?;

        let succ_count = fan_out(comm, pred_ranks).map_err(|e| fail(Phase::FanOut, rank, e))?;
        debug!(%rank, preds = pred_ranks.len(), succs = succ_count, "fan-out counted");

        let mut succ_ranks = exchange_identities(comm, pred_ranks, succ_count, config)
            .map_err(|e| fail(Phase::IdentityExchange, rank, e))?;
        succ_ranks.sort_unstable();
        debug!(%rank, ?succ_ranks, "successors discovered");

        let pred_slots = replay_indices(comm, pred_ranks, &succ_ranks, config)
            .map_err(|e| fail(Phase::IndexReplay, rank, e))?;
        debug!(%rank, ?pred_slots, "predecessor slots received");

        let succ_lookup = succ_ranks
            .iter()
            .enumerate()
            .map(|(slot, &succ)| (succ, Slot(slot as u32)))
            .collect();

        return Ok(Topology {
            rank,
            group_size,
            pred_ranks: pred_ranks.to_vec(),
            pred_slots,
            succ_ranks,
            pred_lookup,
            succ_lookup,
        });
    }

    /// The rank this topology was discovered for.
    #[inline]
    pub fn rank(&self) -> Rank {
        return self.rank;
    }

    #[inline]
    pub fn group_size(&self) -> usize {
        return self.group_size;
    }

    /// Predecessors, in the order they were given.
    #[inline]
    pub fn pred_ranks(&self) -> &[Rank] {
        return &self.pred_ranks;
    }

    /// For each predecessor, the slot on its store that holds this process's
    /// record. Parallel to [`Topology::pred_ranks`].
    #[inline]
    pub fn pred_slots(&self) -> &[Slot] {
        return &self.pred_slots;
    }

    /// Successors in ascending rank order.
    #[inline]
    pub fn succ_ranks(&self) -> &[Rank] {
        return &self.succ_ranks;
    }

    /// Slots on this process's store, parallel to [`Topology::succ_ranks`].
    pub fn succ_slots(&self) -> impl Iterator<Item = Slot> + '_ {
        return (0..self.succ_ranks.len()).map(|slot| Slot(slot as u32));
    }

    #[inline]
    pub fn pred_count(&self) -> usize {
        return self.pred_ranks.len();
    }

    #[inline]
    pub fn succ_count(&self) -> usize {
        return self.succ_ranks.len();
    }

    /// True when nobody sends to this process and it sends to nobody.
    pub fn is_isolated(&self) -> bool {
        return self.pred_ranks.is_empty() && self.succ_ranks.is_empty();
    }

    /// Position of `rank` in the predecessor list.
    pub fn pred_position(&self, rank: Rank) -> Result<usize, Error> {
        return self
            .pred_lookup
            .get(&rank)
            .copied()
            .ok_or(Error::UnknownPredecessor(rank));
    }

    /// The slot predecessor `rank` publishes this process's record at.
    pub fn pred_slot(&self, rank: Rank) -> Result<Slot, Error> {
        let position = self.pred_position(rank)?;
        return Ok(self.pred_slots[position]);
    }

    /// The slot on this process's store that successor `rank` reads.
    pub fn succ_slot(&self, rank: Rank) -> Result<Slot, Error> {
        return self
            .succ_lookup
            .get(&rank)
            .copied()
            .ok_or(Error::UnknownSuccessor(rank));
    }

    /// A fingerprint of this process's view of the topology.
    ///
    /// Two runs that discover the same neighbourhood for a rank produce the
    /// same digest, whatever order identity messages happened to arrive in.
    pub fn digest(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DIGEST_CONTEXT);
        hasher.update(&self.rank.0.to_le_bytes());
        hasher.update(&(self.group_size as u64).to_le_bytes());
        hasher.update(&(self.pred_ranks.len() as u64).to_le_bytes());
        for (pred, slot) in self.pred_ranks.iter().zip(&self.pred_slots) {
            hasher.update(&pred.0.to_le_bytes());
            hasher.update(&slot.0.to_le_bytes());
        }
        hasher.update(&(self.succ_ranks.len() as u64).to_le_bytes());
        for succ in &self.succ_ranks {
            hasher.update(&succ.0.to_le_bytes());
        }
        return hasher.finalize();
    }
}

fn fail(phase: Phase, rank: Rank, source: CommError) -> Error {
    error!(%rank, %phase, error = %source, "topology discovery failed");
    return Error::Topology { phase, rank, source };
}

/// Map each predecessor to its position, rejecting ranks outside the group
/// and repeats. A repeated predecessor would be counted once by the fan-out
/// sum but messaged twice, leaving it waiting on a phantom successor.
fn index_predecessors(pred_ranks: &[Rank], group_size: usize) -> Result<FxHashMap<Rank, usize>, Error> {
    let mut lookup = FxHashMap::default();
    lookup.reserve(pred_ranks.len());
    for (position, &pred) in pred_ranks.iter().enumerate() {
        if pred.index() >= group_size {
            return Err(Error::InvalidPredecessor { rank: pred, group_size });
        }
        if lookup.insert(pred, position).is_some() {
            return Err(Error::DuplicatePredecessor(pred));
        }
    }
    return Ok(lookup);
}

/// Phase 1: how many processes list this one as a predecessor.
fn fan_out<C: Comm>(comm: &mut C, pred_ranks: &[Rank]) -> Result<usize, CommError> {
    let mut indicators = vec![0i64; comm.group_size()];
    for pred in pred_ranks {
        indicators[pred.index()] = 1;
    }
    let counts = comm.reduce_sum_all(&indicators)?;
    let rank = comm.rank();
    let count = counts.get(rank.index()).copied().ok_or(CommError::LengthMismatch {
        expected: comm.group_size(),
        actual: counts.len(),
    })?;
    return usize::try_from(count).map_err(|_| CommError::InvalidCount(count));
}

/// Phase 2: announce this rank to every predecessor and collect one announced
/// rank per successor, in arrival order.
fn exchange_identities<C: Comm>(
    comm: &mut C,
    pred_ranks: &[Rank],
    succ_count: usize,
    config: &Config,
) -> Result<Vec<Rank>, CommError> {
    let own = i64::from(comm.rank().0);
    let mut requests = Vec::with_capacity(pred_ranks.len() + succ_count);
    for &pred in pred_ranks {
        requests.push(comm.post_send(pred, config.identity_tag, own)?);
    }
    for _ in 0..succ_count {
        requests.push(comm.post_recv(Source::Any, config.identity_tag)?);
    }

    let completions = comm.wait_all(requests)?;
    let group_size = comm.group_size();
    return received_values(&completions)
        .map(|value| announced_rank(value, group_size))
        .collect();
}

/// Phase 4: hand each successor its slot and learn the slot each predecessor
/// reserved for this process.
fn replay_indices<C: Comm>(
    comm: &mut C,
    pred_ranks: &[Rank],
    succ_ranks: &[Rank],
    config: &Config,
) -> Result<Vec<Slot>, CommError> {
    let mut requests = Vec::with_capacity(succ_ranks.len() + pred_ranks.len());
    for (slot, &succ) in succ_ranks.iter().enumerate() {
        requests.push(comm.post_send(succ, config.index_tag, slot as i64)?);
    }
    for &pred in pred_ranks {
        requests.push(comm.post_recv(Source::Rank(pred), config.index_tag)?);
    }

    let completions = comm.wait_all(requests)?;
    return received_values(&completions).map(announced_slot).collect();
}

/// Payloads of the receives in a batch, in request order.
fn received_values(completions: &[Completion]) -> impl Iterator<Item = i64> + '_ {
    return completions.iter().filter_map(Completion::value);
}

fn announced_rank(value: i64, group_size: usize) -> Result<Rank, CommError> {
    let rank = u32::try_from(value).map(Rank).map_err(|_| CommError::InvalidRank {
        rank: Rank(u32::MAX),
        group_size,
    })?;
    if rank.index() >= group_size {
        return Err(CommError::InvalidRank { rank, group_size });
    }
    return Ok(rank);
}

fn announced_slot(value: i64) -> Result<Slot, CommError> {
    return u32::try_from(value).map(Slot).map_err(|_| CommError::SlotOutOfBounds {
        owner: Rank(u32::MAX),
        slot: Slot(u32::MAX),
        len: 0,
    });
}
