//! The lattice is a persistent, memory-mapped knowledge-graph node
//! store: fixed-size node records addressed by a 64-bit id (device id
//! in the high word, locally-allocated id in the low word), written
//! through a crash-safe write-ahead log, and served to concurrent
//! readers through a seqlock rather than a mutex.
//!
//! [Lattice] is the crate-root entry point. It composes [store::Store]
//! (the memory-mapped node array), [wal::Wal] (the append-only
//! recovery log), and [prefix_index::PrefixIndex] (the in-memory
//! name-prefix catalogue) behind [seqlock::SeqLock].

mod config;
mod error;
mod lattice;
mod license;
pub mod platform;
pub mod prefix_index;
pub mod seqlock;
pub mod store;
mod util;
pub mod wal;

pub use config::{Config, DEFAULT_EVAL_CAP, FREE_TIER_CAP};
pub use error::{Error, Result};
pub use lattice::{Lattice, State};
pub use license::{LicenseVerifier, NoVerification, Tier};
pub use prefix_index::Filters;
pub use store::node::{NodeRecord, NodeType, Payload};
