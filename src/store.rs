//! The remote clock store and its publisher.
//!
//! A process owns one record per successor. It is the only writer; any
//! successor may read its own slot at any time without the owner's help, and
//! will simply see an older value if it reads between updates.

use crate::clock::ClockRecord;
use crate::comm::ClockRegion;
use crate::rank::Slot;

/// The owner's side of its remotely readable clock records.
#[derive(Debug)]
pub struct ClockStore<R: ClockRegion> {
    region: R,
    next_clock: i64,
}

impl<R: ClockRegion> ClockStore<R> {
    /// Wrap a freshly allocated, zeroed region.
    pub fn new(region: R) -> ClockStore<R> {
        return ClockStore {
            region,
            next_clock: 0,
        };
    }

    /// Number of successor slots.
    #[inline]
    pub fn len(&self) -> usize {
        return self.region.cells().len();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        return self.region.cells().is_empty();
    }

    /// The clock value most recently published.
    #[inline]
    pub fn next_clock(&self) -> i64 {
        return self.next_clock;
    }

    /// Publish `value` as the next logical clock in every successor slot.
    pub fn publish_next_clock(&mut self, value: i64) {
        self.next_clock = value;
        for cell in self.region.cells() {
            cell.store_next_clock(value);
        }
    }

    /// Count one message sent to the successor owning `slot`.
    ///
    /// Returns the new send count, or `None` if the store has no such slot.
    #[inline]
    pub fn record_send(&self, slot: Slot) -> Option<i64> {
        return self.region.cells().get(slot.index()).map(|cell| cell.bump_send_count());
    }

    /// The record currently published at `slot`.
    pub fn published(&self, slot: Slot) -> Option<ClockRecord> {
        return self.region.cells().get(slot.index()).map(|cell| cell.load());
    }

    /// Give the region back, for release.
    pub fn into_region(self) -> R {
        return self.region;
    }
}
