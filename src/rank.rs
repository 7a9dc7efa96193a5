//! Identifiers shared by every layer: process ranks, store slots and
//! message tags.
//!
//! All of them are thin newtypes over integers so that a slot can never be
//! passed where a rank is expected.

use std::fmt;

/// A process identifier within a fixed-size group. Stable for the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rank(pub u32);

impl Rank {
    /// The rank as a vector index.
    #[inline]
    pub fn index(self) -> usize {
        return self.0 as usize;
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{}", self.0);
    }
}

/// A record position inside one process's remote clock store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(pub u32);

impl Slot {
    /// The slot as a vector index.
    #[inline]
    pub fn index(self) -> usize {
        return self.0 as usize;
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{}", self.0);
    }
}

/// A point-to-point message tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tag(pub i32);

/// Where a posted receive accepts messages from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// Match the first message with the right tag, whoever sent it.
    Any,
    /// Match only messages from this rank.
    Rank(Rank),
}

impl Source {
    /// Whether a message from `from` satisfies this source.
    #[inline]
    pub fn accepts(self, from: Rank) -> bool {
        return match self {
            Source::Any => true,
            Source::Rank(rank) => rank == from,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_order_numerically() {
        let mut ranks = vec![Rank(7), Rank(0), Rank(3)];
        ranks.sort();
        assert_eq!(ranks, vec![Rank(0), Rank(3), Rank(7)]);
    }

    #[test]
    fn any_source_accepts_everyone() {
        assert!(Source::Any.accepts(Rank(0)));
        assert!(Source::Any.accepts(Rank(41)));
    }

    #[test]
    fn ranked_source_is_exact() {
        let source = Source::Rank(Rank(2));
        assert!(source.accepts(Rank(2)));
        assert!(!source.accepts(Rank(3)));
    }
}
