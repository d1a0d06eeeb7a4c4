//! Crate-root API type: composes [crate::store::Store],
//! [crate::wal::Wal], and [crate::prefix_index::PrefixIndex] behind a
//! single [crate::seqlock::SeqLock], and tracks the store's lifecycle
//! state machine.

use std::cell::UnsafeCell;
use std::fs;
use std::ops::Range;
use std::sync::Mutex;

use crate::{
    config::{Config, DEFAULT_EVAL_CAP, FREE_TIER_CAP},
    err_at,
    license::{LicenseVerifier, NoVerification, Tier},
    platform,
    prefix_index::{Filters, PrefixIndex},
    seqlock::SeqLock,
    store::{
        node::{NodeRecord, NodeType, Payload},
        Store,
    },
    wal::{OpCode, Wal},
    Result,
};

/// Lifecycle state of a store file, tracked for diagnostics and to
/// reject operations issued out of order. Transitions exactly as
/// `Uninitialised -> Opening -> Open -> Checkpointing -> Open -> Closing
/// -> Closed`; recovery is a sub-phase of `Opening`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialised,
    Opening,
    Open,
    Checkpointing,
    Closing,
    Closed,
}

/// The persistent, memory-mapped node store. One `Lattice` owns exactly
/// one store file and one WAL file; a second concurrent `open` on the
/// same paths fails with [crate::Error::AlreadyOpen].
///
/// `Store` and `PrefixIndex` are mutated only by the single writer path,
/// which serializes through `writer_guard` and publishes its changes by
/// bumping `seq`; readers validate against `seq` instead of taking a
/// lock. This is the same discipline the seqlock module documents, just
/// applied to two pieces of data (the node array, the prefix index)
/// instead of one.
pub struct Lattice {
    state: Mutex<State>,
    writer_guard: Mutex<()>,
    seq: SeqLock,
    store: UnsafeCell<Store>,
    index: UnsafeCell<PrefixIndex>,
    wal: Wal,
    _lock_file: fs::File,
    node_cap: usize,
}

// SAFETY: `store` and `index` are only ever mutated by a thread holding
// `writer_guard`, and every read goes through `seq.read`, which
// validates that no writer was active for the duration of the access.
// This is the same pattern `SeqLock`'s own doc comment describes; here
// it is applied across a pair of interior structures rather than one.
unsafe impl Sync for Lattice {}

impl Lattice {
    /// Open (creating if absent) the store and WAL named in `config`,
    /// using the default no-op license verifier (always evaluation
    /// tier).
    pub fn open(config: &Config) -> Result<Lattice> {
        Lattice::open_with_license(config, &NoVerification, "")
    }

    pub fn open_with_license(
        config: &Config,
        verifier: &dyn LicenseVerifier,
        token: &str,
    ) -> Result<Lattice> {
        let tier = verifier.verify(token)?;
        let node_cap = match tier {
            Tier::Evaluation => config.node_cap.min(DEFAULT_EVAL_CAP),
            Tier::Free => config.node_cap.min(FREE_TIER_CAP),
            Tier::Licensed => config.node_cap,
        };

        let lock_file = err_at!(
            IoError,
            fs::OpenOptions::new().read(true).write(true).create(true).open(&config.store_path)
        )?;
        platform::try_lock_exclusive(&lock_file)?;

        let store_exists = config.store_path.exists();
        let wal_exists = config.wal_path.exists();
        let wal_config = config.wal_config();

        let mut store = if store_exists {
            Store::open(&config.store_path, node_cap, config.cache_mode)?
        } else {
            Store::create(&config.store_path, config.device_id, node_cap, config.cache_mode)?
        };

        if wal_exists {
            let (_header, _discarded) = Wal::recover(&wal_config, |entry| match entry.op {
                OpCode::AddNode => store.apply_add(&entry.payload),
                OpCode::UpdateNode => store.apply_update(entry.node_id, &entry.payload),
                OpCode::DeleteNode => store.apply_delete(entry.node_id),
                OpCode::AddChild => store.apply_add_child(entry.node_id, &entry.payload),
                OpCode::CheckpointMarker => Ok(()),
            })?;
            store.durable_sync()?;
        }

        let wal = if wal_exists { Wal::load(wal_config)? } else { Wal::create(wal_config)? };
        let index = PrefixIndex::rebuild(&store);

        Ok(Lattice {
            state: Mutex::new(State::Open),
            writer_guard: Mutex::new(()),
            seq: SeqLock::new(),
            store: UnsafeCell::new(store),
            index: UnsafeCell::new(index),
            wal,
            _lock_file: lock_file,
            node_cap,
        })
    }

    pub fn state(&self) -> State {
        *self.state.lock().unwrap()
    }

    fn store(&self) -> &Store {
        unsafe { &*self.store.get() }
    }

    #[allow(clippy::mut_from_ref)]
    fn store_mut(&self) -> &mut Store {
        unsafe { &mut *self.store.get() }
    }

    fn index_mut(&self) -> &mut PrefixIndex {
        unsafe { &mut *self.index.get() }
    }

    /// Snapshot read of one node's full record.
    pub fn get(&self, id: u64) -> Result<NodeRecord> {
        self.seq.read(|| self.store().get(id))?
    }

    /// Snapshot read of one node's payload interpreted as binary,
    /// returning `(length, compressed, bytes)`.
    pub fn get_binary(&self, id: u64) -> Result<(usize, bool, Vec<u8>)> {
        self.seq.read(|| self.store().get_binary(id))?
    }

    pub fn find_by_prefix(&self, prefix: &str, limit: usize, filters: Filters) -> Result<Vec<u64>> {
        self.seq.read(|| unsafe { (*self.index.get()).find(prefix, limit, filters) })
    }

    pub fn add(
        &self,
        kind: NodeType,
        name: &str,
        payload: &Payload,
        parent_id: u64,
        timestamp: u64,
        confidence: f64,
    ) -> Result<u64> {
        let _writer = self.writer_guard.lock().unwrap();
        let (_version, result) = self.seq.write(|| {
            self.store_mut().add(&self.wal, kind, name.as_bytes(), payload, parent_id, timestamp, confidence)
        })?;
        let (id, sequence) = result?;
        self.wal.wait_flushed(sequence)?;

        let _version2 = self.seq.write(|| self.index_mut().insert(id, name, confidence, timestamp))?;
        Ok(id)
    }

    pub fn update(&self, id: u64, payload: &Payload, timestamp: u64) -> Result<()> {
        let _writer = self.writer_guard.lock().unwrap();
        let (_version, sequence) =
            self.seq.write(|| self.store_mut().update(&self.wal, id, payload, timestamp))?;
        self.wal.wait_flushed(sequence?)?;
        Ok(())
    }

    pub fn delete(&self, id: u64) -> Result<()> {
        let _writer = self.writer_guard.lock().unwrap();
        let record = self.get(id)?;
        let name = record.name_str().map(str::to_string).ok();

        let (_version, sequence) = self.seq.write(|| self.store_mut().delete(&self.wal, id))?;
        self.wal.wait_flushed(sequence?)?;

        if let Some(name) = name {
            let _ = self.seq.write(|| self.index_mut().remove(id, &name));
        }
        Ok(())
    }

    pub fn add_child(&self, parent_id: u64, child_id: u64) -> Result<()> {
        let _writer = self.writer_guard.lock().unwrap();
        let (_version, sequence) =
            self.seq.write(|| self.store_mut().add_child(&self.wal, parent_id, child_id))?;
        self.wal.wait_flushed(sequence?)?;
        Ok(())
    }

    /// Reserve a contiguous block of `n` local ids for a caller that
    /// wants to pre-assign ids before the corresponding `add` calls.
    /// No durability is required: ids are re-derivable from the
    /// allocator's watermark on recovery.
    pub fn reserve_ids(&self, n: u32) -> Range<u32> {
        let _writer = self.writer_guard.lock().unwrap();
        self.store().reserve_ids(n)
    }

    pub fn checkpoint(&self) -> Result<()> {
        let _writer = self.writer_guard.lock().unwrap();
        *self.state.lock().unwrap() = State::Checkpointing;

        let result = self.wal.checkpoint(|| {
            let (_version, result) = self.seq.write(|| self.store_mut().sync_header())?;
            result
        });

        *self.state.lock().unwrap() = State::Open;
        result
    }

    pub fn node_cap(&self) -> usize {
        self.node_cap
    }

    pub fn close(self) -> Result<()> {
        *self.state.lock().unwrap() = State::Closing;
        self.wal.close()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "lattice_test.rs"]
mod lattice_test;
