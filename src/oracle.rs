//! Deciding whether a predecessor still has messages in flight.
//!
//! The test compares what a predecessor said it had sent (as of the last
//! collected snapshot) with what this process has consumed from it. A send
//! count above the receive count means something may still be on the wire.
//! The answer is only as fresh as the snapshot, so a caller wanting a real
//! barrier must collect first and must not have receives from that
//! predecessor pending at the same time.

use std::fmt;

use crate::clock::ClockRecord;

/// Where a predecessor stands, as of the last snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerState {
    /// No snapshot covers this predecessor yet, or the last round failed.
    Unknown,
    /// It has sent more than has been consumed here.
    InFlight,
    /// Everything it had sent has been consumed here.
    Quiescent,
}

impl PeerState {
    /// Classify a predecessor from its last snapshot and the local receive
    /// count for it.
    #[inline]
    pub fn classify(snapshot: Option<ClockRecord>, received: i64) -> PeerState {
        return match snapshot {
            None => PeerState::Unknown,
            Some(record) if record.send_count > received => PeerState::InFlight,
            Some(_) => PeerState::Quiescent,
        };
    }

    /// Whether messages may still be in flight. Unknown counts as in flight.
    #[inline]
    pub fn has_in_flight(self) -> bool {
        return self != PeerState::Quiescent;
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerState::Unknown => "unknown",
            PeerState::InFlight => "in flight",
            PeerState::Quiescent => "quiescent",
        };
        return f.write_str(name);
    }
}

/// Messages consumed per predecessor, by predecessor position.
#[derive(Clone, Debug, Default)]
pub struct ReceiveCounters {
    counts: Vec<i64>,
}

impl ReceiveCounters {
    pub fn new(pred_count: usize) -> ReceiveCounters {
        return ReceiveCounters {
            counts: vec![0; pred_count],
        };
    }

    /// Count one consumed message from the predecessor at `position`,
    /// returning the new count.
    #[inline]
    pub fn record_recv(&mut self, position: usize) -> Option<i64> {
        let count = self.counts.get_mut(position)?;
        *count += 1;
        return Some(*count);
    }

    /// Messages consumed so far from the predecessor at `position`.
    #[inline]
    pub fn received(&self, position: usize) -> Option<i64> {
        return self.counts.get(position).copied();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(send_count: i64) -> Option<ClockRecord> {
        return Some(ClockRecord { next_clock: 0, send_count });
    }

    #[test]
    fn no_snapshot_is_unknown() {
        assert_eq!(PeerState::classify(None, 0), PeerState::Unknown);
        assert!(PeerState::Unknown.has_in_flight());
    }

    #[test]
    fn more_sent_than_received_is_in_flight() {
        assert_eq!(PeerState::classify(sent(3), 2), PeerState::InFlight);
        assert!(PeerState::InFlight.has_in_flight());
    }

    #[test]
    fn equal_counts_are_quiescent() {
        assert_eq!(PeerState::classify(sent(2), 2), PeerState::Quiescent);
        assert!(!PeerState::Quiescent.has_in_flight());
    }

    #[test]
    fn stale_snapshot_behind_receives_is_quiescent() {
        // A snapshot taken before the latest sends can trail the receive
        // count; everything it claims was sent has been consumed.
        assert_eq!(PeerState::classify(sent(1), 4), PeerState::Quiescent);
    }

    #[test]
    fn zero_traffic_is_quiescent() {
        assert_eq!(PeerState::classify(sent(0), 0), PeerState::Quiescent);
    }

    #[test]
    fn counters_are_per_position() {
        let mut counters = ReceiveCounters::new(2);
        assert_eq!(counters.record_recv(1), Some(1));
        assert_eq!(counters.record_recv(1), Some(2));
        assert_eq!(counters.received(0), Some(0));
        assert_eq!(counters.received(1), Some(2));
    }

    #[test]
    fn unknown_position_is_rejected() {
        let mut counters = ReceiveCounters::new(1);
        assert_eq!(counters.record_recv(1), None);
        assert_eq!(counters.received(1), None);
    }
}
