//! Error types for the substrate and the quiescence core.

use std::fmt;

use crate::rank::Rank;
use crate::rank::Slot;

/// Failures reported by a communication substrate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    /// The rank is outside the process group.
    #[error("rank {rank} is outside a group of {group_size}")]
    InvalidRank { rank: Rank, group_size: usize },

    /// A peer endpoint went away, or the group was torn down, while traffic
    /// was still expected.
    #[error("peer endpoint disconnected")]
    Disconnected,

    /// A reduction produced a count no process can act on.
    #[error("reduction produced invalid count {0}")]
    InvalidCount(i64),

    /// A reduction contribution did not match the group's vector length.
    #[error("reduction length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The owner has no remotely readable region (never allocated, or freed).
    #[error("rank {0} has no remotely readable region")]
    NoRegion(Rank),

    /// A one-sided read addressed a slot past the end of the owner's region.
    #[error("slot {slot} is out of bounds for rank {owner} ({len} records)")]
    SlotOutOfBounds { owner: Rank, slot: Slot, len: usize },

    /// This process already holds a region.
    #[error("rank {0} already holds a remotely readable region")]
    RegionExists(Rank),
}

/// The collective step of topology discovery that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Group-wide sum of predecessor indicator vectors.
    FanOut,
    /// Each process announces its rank to its predecessors.
    IdentityExchange,
    /// Each process hands successors their slot on its store.
    IndexReplay,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::FanOut => "fan-out count",
            Phase::IdentityExchange => "identity exchange",
            Phase::IndexReplay => "index replay",
        };
        return f.write_str(name);
    }
}

/// Errors surfaced by the quiescence core.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A collective step of topology discovery failed. Initialization aborts.
    #[error("topology discovery failed during {phase} on rank {rank}: {source}")]
    Topology {
        phase: Phase,
        rank: Rank,
        #[source]
        source: CommError,
    },

    /// The remote clock store could not be allocated or released.
    #[error("remote clock store allocation failed on rank {rank}: {source}")]
    Allocation {
        rank: Rank,
        #[source]
        source: CommError,
    },

    /// A one-sided read or the completing flush failed; the round is void.
    #[error("clock collection failed on rank {rank}: {source}")]
    Transfer {
        rank: Rank,
        #[source]
        source: CommError,
    },

    /// The rank is not one of this process's predecessors.
    #[error("rank {0} is not a predecessor of this process")]
    UnknownPredecessor(Rank),

    /// The rank is not one of this process's successors.
    #[error("rank {0} is not a successor of this process")]
    UnknownSuccessor(Rank),

    /// A listed predecessor is outside the process group.
    #[error("predecessor {rank} is outside a group of {group_size}")]
    InvalidPredecessor { rank: Rank, group_size: usize },

    /// A predecessor was listed more than once.
    #[error("predecessor {0} is listed more than once")]
    DuplicatePredecessor(Rank),

    /// The configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("quiescence layer is not initialized")]
    NotInitialized,

    #[error("quiescence layer is already initialized")]
    AlreadyInitialized,

    #[error("quiescence layer has been finalized")]
    Finalized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_error_names_phase_and_rank() {
        let error = Error::Topology {
            phase: Phase::IdentityExchange,
            rank: Rank(3),
            source: CommError::Disconnected,
        };
        let message = error.to_string();
        assert!(message.contains("identity exchange"));
        assert!(message.contains("rank 3"));
    }

    #[test]
    fn transfer_error_exposes_source() {
        let error = Error::Transfer {
            rank: Rank(1),
            source: CommError::NoRegion(Rank(0)),
        };
        let source = std::error::Error::source(&error).expect("has a source");
        assert_eq!(source.to_string(), "rank 0 has no remotely readable region");
    }
}
