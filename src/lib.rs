//! Quiesce - causal quiescence detection for message-passing process groups.
//!
//! A group of processes (ranks) exchange point-to-point messages over a
//! static, sparse topology. Each process knows only whom it receives from.
//! This crate answers, for any process and any of its predecessors: has
//! everything that predecessor sent here been delivered and consumed?
//!
//! It does so in three layers:
//!
//! - [`topology`]: a one-time collective that turns each process's
//!   predecessor list into a successor list, with agreed slot indices on both
//!   sides.
//! - [`store`] and [`collector`]: each process publishes per-successor send
//!   counters in a remotely readable store; successors pull them one-sidedly,
//!   without the owner's participation.
//! - [`oracle`]: compares the pulled send counts with local receive counts.
//!
//! [`Quiescence`] ties them together per process, over any [`comm::Comm`]
//! substrate.
//!
//! # Quick Start
//!
//! ```
//! use quiesce::Quiescence;
//! use quiesce::Rank;
//! use quiesce::comm::local::LocalGroup;
//!
//! // A single process that sends to itself.
//! let comm = LocalGroup::new(1).pop().unwrap();
//! let mut q = Quiescence::new(comm);
//! q.initialize(&[Rank(0)]).unwrap();
//!
//! q.record_send(Rank(0)).unwrap();
//! q.collect().unwrap();
//! assert!(q.has_in_flight(Rank(0)).unwrap());
//!
//! q.record_recv(Rank(0)).unwrap();
//! q.collect().unwrap();
//! assert!(!q.has_in_flight(Rank(0)).unwrap());
//!
//! q.finalize().unwrap();
//! ```

pub mod clock;
pub mod collector;
pub mod comm;
pub mod config;
pub mod error;
pub mod oracle;
pub mod quiescence;
pub mod rank;
pub mod store;
pub mod topology;

pub use clock::ClockRecord;
pub use config::Config;
pub use error::CommError;
pub use error::Error;
pub use oracle::PeerState;
pub use quiescence::Quiescence;
pub use rank::Rank;
pub use rank::Slot;
pub use topology::Topology;
