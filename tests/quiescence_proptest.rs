//! Property-based tests for clock propagation and the quiescence oracle.
//!
//! A single rank with a self-edge exercises the whole path (publish, one-sided
//! read, oracle) deterministically, so the oracle can be checked against a
//! plain model after every step.

use proptest::prelude::*;
use quiesce::PeerState;
use quiesce::Quiescence;
use quiesce::Rank;
use quiesce::comm::local::LocalGroup;

// =============================================================================
// Test helpers
// =============================================================================

#[derive(Clone, Debug)]
enum Event {
    Send,
    Recv,
    Collect,
    Publish(i64),
}

fn arbitrary_event() -> impl Strategy<Value = Event> {
    return prop_oneof![
        3 => Just(Event::Send),
        3 => Just(Event::Recv),
        2 => Just(Event::Collect),
        1 => any::<i64>().prop_map(Event::Publish),
    ];
}

/// What the oracle should conclude, tracked independently.
#[derive(Default)]
struct Model {
    sent: i64,
    received: i64,
    snapshot: Option<i64>,
}

impl Model {
    fn expected(&self) -> PeerState {
        return match self.snapshot {
            None => PeerState::Unknown,
            Some(sent) if sent > self.received => PeerState::InFlight,
            Some(_) => PeerState::Quiescent,
        };
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The oracle agrees with the model after every event, counters never go
    /// down, and a quiescent answer never outruns what was counted as sent.
    #[test]
    fn oracle_matches_model(events in prop::collection::vec(arbitrary_event(), 1..80)) {
        let me = Rank(0);
        let comm = LocalGroup::new(1).pop().unwrap();
        let mut q = Quiescence::new(comm);
        q.initialize(&[me]).unwrap();

        let mut model = Model::default();
        let mut last_sent = 0;
        let mut last_received = 0;

        for event in &events {
            match event {
                Event::Send => {
                    q.record_send(me).unwrap();
                    model.sent += 1;
                }
                Event::Recv => {
                    // Only consume what has actually been sent.
                    if model.received < model.sent {
                        q.record_recv(me).unwrap();
                        model.received += 1;
                    }
                }
                Event::Collect => {
                    q.collect().unwrap();
                    model.snapshot = Some(model.sent);
                }
                Event::Publish(value) => {
                    q.publish_next_clock(*value).unwrap();
                }
            }

            prop_assert_eq!(q.state(me).unwrap(), model.expected());

            let sent = q.sent_to(me).unwrap();
            let received = q.received_from(me).unwrap();
            prop_assert!(sent >= last_sent);
            prop_assert!(received >= last_received);
            last_sent = sent;
            last_received = received;

            if let Some(snapshot) = q.snapshot_of(me).unwrap() {
                if !q.has_in_flight(me).unwrap() {
                    prop_assert!(snapshot.send_count <= received);
                }
            }
        }

        q.finalize().unwrap();
    }

    /// Immediately after a collect, the latest published clock is what the
    /// snapshot carries.
    #[test]
    fn snapshot_carries_latest_clock(values in prop::collection::vec(any::<i64>(), 1..20)) {
        let me = Rank(0);
        let comm = LocalGroup::new(1).pop().unwrap();
        let mut q = Quiescence::new(comm);
        q.initialize(&[me]).unwrap();

        for value in &values {
            q.publish_next_clock(*value).unwrap();
        }
        q.collect().unwrap();

        let snapshot = q.snapshot_of(me).unwrap().unwrap();
        prop_assert_eq!(Some(snapshot.next_clock), values.last().copied());
        prop_assert_eq!(q.next_clock().unwrap(), snapshot.next_clock);
        q.finalize().unwrap();
    }
}
