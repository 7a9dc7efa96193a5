//! The per-process quiescence context.
//!
//! [`Quiescence`] owns a process's endpoint and everything derived from it:
//! the discovered topology, the clock store its successors read, the
//! snapshot of its predecessors' stores, and its receive counters. Nothing is
//! process-global, so several contexts can live side by side (one per thread
//! over a [`LocalGroup`](crate::comm::local::LocalGroup), for instance).
//!
//! A context is single use: `initialize` once, then any number of
//! `record_send` / `record_recv` / `publish_next_clock` / `collect` /
//! `has_in_flight` calls, then `finalize`.

use tracing::error;
use tracing::info;

use crate::clock::ClockRecord;
use crate::collector::Collector;
use crate::comm::Comm;
use crate::config::Config;
use crate::error::Error;
use crate::oracle::PeerState;
use crate::oracle::ReceiveCounters;
use crate::rank::Rank;
use crate::store::ClockStore;
use crate::topology::Topology;

/// State held between `initialize` and `finalize`.
struct Live<C: Comm> {
    topology: Topology,
    store: ClockStore<C::Region>,
    collector: Collector,
    counters: ReceiveCounters,
}

enum Lifecycle<C: Comm> {
    Idle,
    Live(Live<C>),
    Finalized,
}

/// Quiescence detection for one process of a group.
pub struct Quiescence<C: Comm> {
    comm: C,
    config: Config,
    lifecycle: Lifecycle<C>,
}

impl<C: Comm> Quiescence<C> {
    /// A context over `comm` with the default configuration.
    pub fn new(comm: C) -> Quiescence<C> {
        return Quiescence::with_config(comm, Config::default());
    }

    pub fn with_config(comm: C, config: Config) -> Quiescence<C> {
        return Quiescence {
            comm,
            config,
            lifecycle: Lifecycle::Idle,
        };
    }

    /// Discover the topology and allocate the clock store.
    ///
    /// Collective: every process of the group must call this, each with the
    /// ranks it receives from. Fails, without leaving partial state behind,
    /// if discovery or allocation fails.
    pub fn initialize(&mut self, pred_ranks: &[Rank]) -> Result<(), Error> {
        match self.lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Live(_) => return Err(Error::AlreadyInitialized),
            Lifecycle::Finalized => return Err(Error::Finalized),
        }

        let rank = self.comm.rank();
        let topology = Topology::discover(&mut self.comm, pred_ranks, &self.config).inspect_err(|e| {
            error!(%rank, error = %e, "initialization aborted");
        })?;

        let region = self
            .comm
            .alloc_remote_readable(topology.succ_count())
            .map_err(|source| {
                error!(%rank, error = %source, "clock store allocation failed");
                return Error::Allocation { rank, source };
            })?;

        info!(
            %rank,
            preds = topology.pred_count(),
            succs = topology.succ_count(),
            digest = %topology.digest().to_hex(),
            "quiescence layer initialized"
        );

        self.lifecycle = Lifecycle::Live(Live {
            store: ClockStore::new(region),
            collector: Collector::new(topology.pred_count()),
            counters: ReceiveCounters::new(topology.pred_count()),
            topology,
        });
        return Ok(());
    }

    pub fn is_initialized(&self) -> bool {
        return matches!(self.lifecycle, Lifecycle::Live(_));
    }

    /// Release the clock store.
    ///
    /// Collective: the store is freed only once every process has stopped
    /// reading. The context cannot be used afterwards.
    pub fn finalize(&mut self) -> Result<(), Error> {
        let live = match std::mem::replace(&mut self.lifecycle, Lifecycle::Finalized) {
            Lifecycle::Live(live) => live,
            Lifecycle::Idle => {
                self.lifecycle = Lifecycle::Idle;
                return Err(Error::NotInitialized);
            }
            Lifecycle::Finalized => return Err(Error::Finalized),
        };

        let rank = live.topology.rank();
        self.comm
            .free_remote_readable(live.store.into_region())
            .map_err(|source| {
                error!(%rank, error = %source, "clock store release failed");
                return Error::Allocation { rank, source };
            })?;
        info!(%rank, rounds = live.collector.rounds(), "quiescence layer finalized");
        return Ok(());
    }

    /// Count one application message sent to `dest`.
    pub fn record_send(&mut self, dest: Rank) -> Result<(), Error> {
        let live = self.live()?;
        let slot = live.topology.succ_slot(dest)?;
        live.store.record_send(slot).ok_or(Error::UnknownSuccessor(dest))?;
        return Ok(());
    }

    /// Count one application message consumed from `source`.
    pub fn record_recv(&mut self, source: Rank) -> Result<(), Error> {
        let live = self.live_mut()?;
        let position = live.topology.pred_position(source)?;
        live.counters
            .record_recv(position)
            .ok_or(Error::UnknownPredecessor(source))?;
        return Ok(());
    }

    /// Publish `value` as this process's next logical clock to every
    /// successor.
    pub fn publish_next_clock(&mut self, value: i64) -> Result<(), Error> {
        let live = self.live_mut()?;
        live.store.publish_next_clock(value);
        return Ok(());
    }

    /// Refresh the snapshot of every predecessor's record.
    ///
    /// On failure every predecessor reads as [`PeerState::Unknown`] until a
    /// later round succeeds.
    pub fn collect(&mut self) -> Result<(), Error> {
        let live = match &mut self.lifecycle {
            Lifecycle::Live(live) => live,
            Lifecycle::Idle => return Err(Error::NotInitialized),
            Lifecycle::Finalized => return Err(Error::Finalized),
        };
        return live.collector.collect(&mut self.comm, &live.topology);
    }

    /// Where `source` stands as of the last collected snapshot.
    pub fn state(&self, source: Rank) -> Result<PeerState, Error> {
        let live = self.live()?;
        let position = live.topology.pred_position(source)?;
        let received = live.counters.received(position).ok_or(Error::UnknownPredecessor(source))?;
        return Ok(PeerState::classify(live.collector.snapshot(position), received));
    }

    /// Whether messages from `source` may still be in flight.
    ///
    /// Conservative: `false` only when the last snapshot shows `source` had
    /// sent no more than has been consumed here. Trust it only right after a
    /// successful [`Quiescence::collect`].
    pub fn has_in_flight(&self, source: Rank) -> Result<bool, Error> {
        return Ok(self.state(source)?.has_in_flight());
    }

    /// Messages counted as sent to `dest` so far.
    pub fn sent_to(&self, dest: Rank) -> Result<i64, Error> {
        let live = self.live()?;
        let slot = live.topology.succ_slot(dest)?;
        let record = live.store.published(slot).ok_or(Error::UnknownSuccessor(dest))?;
        return Ok(record.send_count);
    }

    /// Messages counted as consumed from `source` so far.
    pub fn received_from(&self, source: Rank) -> Result<i64, Error> {
        let live = self.live()?;
        let position = live.topology.pred_position(source)?;
        return live.counters.received(position).ok_or(Error::UnknownPredecessor(source));
    }

    /// The record last collected from `source`, if any.
    pub fn snapshot_of(&self, source: Rank) -> Result<Option<ClockRecord>, Error> {
        let live = self.live()?;
        let position = live.topology.pred_position(source)?;
        return Ok(live.collector.snapshot(position));
    }

    /// The clock value last published.
    pub fn next_clock(&self) -> Result<i64, Error> {
        return Ok(self.live()?.store.next_clock());
    }

    pub fn topology(&self) -> Result<&Topology, Error> {
        return Ok(&self.live()?.topology);
    }

    pub fn config(&self) -> &Config {
        return &self.config;
    }

    /// The underlying endpoint, for the application's own traffic.
    pub fn comm(&self) -> &C {
        return &self.comm;
    }

    pub fn comm_mut(&mut self) -> &mut C {
        return &mut self.comm;
    }

    fn live(&self) -> Result<&Live<C>, Error> {
        return match &self.lifecycle {
            Lifecycle::Live(live) => Ok(live),
            Lifecycle::Idle => Err(Error::NotInitialized),
            Lifecycle::Finalized => Err(Error::Finalized),
        };
    }

    fn live_mut(&mut self) -> Result<&mut Live<C>, Error> {
        return match &mut self.lifecycle {
            Lifecycle::Live(live) => Ok(live),
            Lifecycle::Idle => Err(Error::NotInitialized),
            Lifecycle::Finalized => Err(Error::Finalized),
        };
    }
}
