//! Clock records published to successors.
//!
//! A record is the fixed pair `{ next_clock: i64, send_count: i64 }`.
//! [`ClockRecord`] is the plain value a reader ends up with; [`ClockCell`]
//! is the shared, remotely readable form living in an owner's store.
//!
//! Each field of a cell is its own atomic word. A reader may therefore see
//! `next_clock` and `send_count` from different instants, but it can never
//! see a `send_count` that was not published at some point, and successive
//! reads of one cell never go backwards.

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

/// Size of one record on the wire: two little-endian `i64`s.
pub const RECORD_SIZE: usize = 16;

/// A copied-out clock record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct ClockRecord {
    /// The logical clock the owner will stamp on its next epoch boundary.
    pub next_clock: i64,
    /// Messages the owner has sent to the successor holding this slot.
    pub send_count: i64,
}

impl ClockRecord {
    /// Encode as `next_clock` then `send_count`, little-endian.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[..8].copy_from_slice(&self.next_clock.to_le_bytes());
        bytes[8..].copy_from_slice(&self.send_count.to_le_bytes());
        return bytes;
    }

    /// Decode the layout written by [`ClockRecord::to_bytes`].
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> ClockRecord {
        let mut next_clock = [0u8; 8];
        let mut send_count = [0u8; 8];
        next_clock.copy_from_slice(&bytes[..8]);
        send_count.copy_from_slice(&bytes[8..]);
        return ClockRecord {
            next_clock: i64::from_le_bytes(next_clock),
            send_count: i64::from_le_bytes(send_count),
        };
    }
}

/// A remotely readable clock record with a single writer.
#[derive(Debug, Default)]
#[repr(C)]
pub struct ClockCell {
    next_clock: AtomicI64,
    send_count: AtomicI64,
}

impl ClockCell {
    /// A zeroed cell.
    pub fn new() -> ClockCell {
        return ClockCell::default();
    }

    /// Read both fields. Used by remote readers and by the owner alike.
    #[inline]
    pub fn load(&self) -> ClockRecord {
        return ClockRecord {
            next_clock: self.next_clock.load(Ordering::Acquire),
            send_count: self.send_count.load(Ordering::Acquire),
        };
    }

    /// Overwrite the logical clock.
    #[inline]
    pub fn store_next_clock(&self, value: i64) {
        self.next_clock.store(value, Ordering::Release);
    }

    /// Count one more message to this slot's successor, returning the new count.
    ///
    /// The owner is the only writer, so a load/store pair is enough; no
    /// read-modify-write is needed.
    #[inline]
    pub fn bump_send_count(&self) -> i64 {
        let next = self.send_count.load(Ordering::Relaxed) + 1;
        self.send_count.store(next, Ordering::Release);
        return next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cell_is_zero() {
        let cell = ClockCell::new();
        assert_eq!(cell.load(), ClockRecord::default());
    }

    #[test]
    fn bump_counts_one_at_a_time() {
        let cell = ClockCell::new();
        assert_eq!(cell.bump_send_count(), 1);
        assert_eq!(cell.bump_send_count(), 2);
        assert_eq!(cell.load().send_count, 2);
    }

    #[test]
    fn next_clock_does_not_touch_send_count() {
        let cell = ClockCell::new();
        cell.bump_send_count();
        cell.store_next_clock(99);
        assert_eq!(cell.load(), ClockRecord { next_clock: 99, send_count: 1 });
    }

    #[test]
    fn byte_layout_is_next_clock_then_send_count() {
        let record = ClockRecord { next_clock: 1, send_count: -2 };
        let bytes = record.to_bytes();
        assert_eq!(&bytes[..8], &1i64.to_le_bytes());
        assert_eq!(&bytes[8..], &(-2i64).to_le_bytes());
        assert_eq!(ClockRecord::from_bytes(&bytes), record);
        assert_eq!(std::mem::size_of::<ClockRecord>(), RECORD_SIZE);
    }
}
