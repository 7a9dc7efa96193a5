//! Property-based tests for topology discovery over random topologies.

use proptest::prelude::*;
use quiesce::Config;
use quiesce::Rank;
use quiesce::Topology;
use quiesce::comm::Comm;
use quiesce::comm::local::LocalGroup;

// =============================================================================
// Test helpers
// =============================================================================

/// A group of 1 to 6 ranks, each listing a random subset of the group
/// (itself included) as predecessors, in random order.
fn arbitrary_topology() -> impl Strategy<Value = Vec<Vec<u32>>> {
    return (1usize..=6).prop_flat_map(|size| {
        let everyone: Vec<u32> = (0..size as u32).collect();
        prop::collection::vec(
            prop::sample::subsequence(everyone, 0..=size).prop_shuffle(),
            size,
        )
    });
}

fn discover(preds: &[Vec<u32>]) -> Vec<Topology> {
    return LocalGroup::run(preds.len(), |mut comm| {
        let mine: Vec<Rank> = preds[comm.rank().index()].iter().map(|&r| Rank(r)).collect();
        return Topology::discover(&mut comm, &mine, &Config::default()).unwrap();
    });
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A rank's successors are exactly the ranks naming it, ascending.
    #[test]
    fn successors_are_sorted_readers(preds in arbitrary_topology()) {
        let topologies = discover(&preds);

        for (rank, topology) in topologies.iter().enumerate() {
            let mut readers: Vec<Rank> = preds
                .iter()
                .enumerate()
                .filter(|(_, list)| list.contains(&(rank as u32)))
                .map(|(reader, _)| Rank(reader as u32))
                .collect();
            readers.sort();
            prop_assert_eq!(topology.succ_ranks(), readers.as_slice());
            prop_assert_eq!(topology.succ_slots().count(), readers.len());
        }
    }

    /// Each reader's predecessor slot is the slot its predecessor gave it.
    #[test]
    fn slots_agree_across_every_edge(preds in arbitrary_topology()) {
        let topologies = discover(&preds);

        for (reader, topology) in topologies.iter().enumerate() {
            let reader = Rank(reader as u32);
            prop_assert_eq!(topology.pred_ranks().len(), topology.pred_slots().len());
            for (&pred, &slot) in topology.pred_ranks().iter().zip(topology.pred_slots()) {
                prop_assert_eq!(topologies[pred.index()].succ_slot(reader), Ok(slot));
            }
        }
    }

    /// Rerunning discovery on the same input rebuilds the same topology,
    /// however the identity messages happened to interleave.
    #[test]
    fn discovery_is_deterministic(preds in arbitrary_topology()) {
        let first = discover(&preds);
        let second = discover(&preds);

        for (a, b) in first.iter().zip(&second) {
            prop_assert_eq!(a, b);
            prop_assert_eq!(a.digest(), b.digest());
        }
    }
}
