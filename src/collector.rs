//! Pulls predecessors' published clock records into a local snapshot.

use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::clock::ClockRecord;
use crate::comm::Comm;
use crate::error::CommError;
use crate::error::Error;
use crate::topology::Topology;

/// The latest record read from each predecessor, by predecessor position.
///
/// `None` means no successful round has covered that predecessor yet, or the
/// most recent round failed.
#[derive(Clone, Debug, Default)]
pub struct Collector {
    snapshot: Vec<Option<ClockRecord>>,
    rounds: u64,
}

impl Collector {
    /// An empty snapshot for `pred_count` predecessors.
    pub fn new(pred_count: usize) -> Collector {
        return Collector {
            snapshot: vec![None; pred_count],
            rounds: 0,
        };
    }

    /// Read every predecessor's record for this process, one-sidedly, and
    /// replace the snapshot wholesale once all reads have completed.
    ///
    /// Records from different predecessors may reflect different instants.
    /// On failure the whole snapshot is discarded, since a missing record
    /// cannot be told apart from a stale one.
    pub fn collect<C: Comm>(&mut self, comm: &mut C, topology: &Topology) -> Result<(), Error> {
        let rank = topology.rank();
        let records = match issue_reads(comm, topology) {
            Ok(records) => records,
            Err(source) => {
                self.invalidate();
                error!(%rank, error = %source, "clock collection failed");
                return Err(Error::Transfer { rank, source });
            }
        };

        for (entry, record) in self.snapshot.iter_mut().zip(records) {
            *entry = Some(record);
        }
        self.rounds += 1;
        trace!(%rank, round = self.rounds, preds = self.snapshot.len(), "clocks collected");
        return Ok(());
    }

    /// The record last read from the predecessor at `position`.
    #[inline]
    pub fn snapshot(&self, position: usize) -> Option<ClockRecord> {
        return self.snapshot.get(position).copied().flatten();
    }

    /// Successful rounds so far.
    #[inline]
    pub fn rounds(&self) -> u64 {
        return self.rounds;
    }

    /// Forget every record.
    pub fn invalidate(&mut self) {
        self.snapshot.fill(None);
    }
}

fn issue_reads<C: Comm>(comm: &mut C, topology: &Topology) -> Result<Vec<ClockRecord>, CommError> {
    for (&pred, &slot) in topology.pred_ranks().iter().zip(topology.pred_slots()) {
        if let Err(error) = comm.get(pred, slot) {
            // Drain whatever was queued so the next round starts clean.
            if let Err(drain) = comm.flush_local() {
                warn!(rank = %topology.rank(), error = %drain, "draining queued reads failed");
            }
            return Err(error);
        }
    }

    let records = comm.flush_local()?;
    if records.len() != topology.pred_count() {
        return Err(CommError::LengthMismatch {
            expected: topology.pred_count(),
            actual: records.len(),
        });
    }
    return Ok(records);
}
