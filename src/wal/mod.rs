//! Module `wal` implements the append-only write-ahead log: a 24-byte
//! header followed by length-prefixed entries, appended by a single
//! background flusher thread that owns the file exclusively.
//!
//! Grounded on the `util::thread::Thread` gen-server pattern used by the
//! pack's own write-ahead log, re-specialized to the fixed wire format
//! this store commits to (single file, no journal rotation, explicit
//! `{seq,op,node_id,payload_len,payload}` entries) rather than a
//! cbor-batch journal format.

use std::time::Duration;

mod entry;
mod header;
mod wal;

pub use entry::{Entry, OpCode, ENTRY_HEADER_LEN};
pub use header::{Header, HEADER_LEN, MAGIC};
pub use wal::Wal;

/// Default sliding window the flusher uses to decide whether to bias
/// toward throughput (larger batches) or latency (smaller batches).
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(1000);
pub const DEFAULT_BATCH_MIN: usize = 1;
pub const DEFAULT_BATCH_MAX: usize = 4096;

/// Configuration for a [Wal] instance, following the pack's setter-method
/// convention for configuration structs.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) path: std::path::PathBuf,
    pub(crate) fsync: bool,
    pub(crate) batch_min: usize,
    pub(crate) batch_max: usize,
    pub(crate) batch_window: Duration,
}

impl Config {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Config {
        Config {
            path: path.into(),
            fsync: true,
            batch_min: DEFAULT_BATCH_MIN,
            batch_max: DEFAULT_BATCH_MAX,
            batch_window: DEFAULT_BATCH_WINDOW,
        }
    }

    pub fn set_fsync(&mut self, fsync: bool) -> &mut Self {
        self.fsync = fsync;
        self
    }

    pub fn set_batch_bounds(&mut self, min: usize, max: usize) -> &mut Self {
        self.batch_min = min;
        self.batch_max = max;
        self
    }

    pub fn set_batch_window(&mut self, window: Duration) -> &mut Self {
        self.batch_window = window;
        self
    }
}
