//! Per-slot access bookkeeping used by the LRU eviction policy when the
//! store runs in "cache mode" (a bounded RAM cache backed by a larger
//! on-disk file). In disk mode the whole file is mapped and the OS page
//! cache does this job instead, so no instance of this type is consulted.
//!
//! Adapted from the access-count/last-access-timestamp bookkeeping in
//! `clru::access`, but backed by plain per-slot atomics rather than a
//! generic keyed linked list: the Lattice's slots are already
//! array-indexed, so there is no need for a hash-keyed cache structure.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering::Relaxed};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub struct SlotAccess {
    count: AtomicU32,
    last_access_micros: AtomicU64,
}

impl Default for SlotAccess {
    fn default() -> SlotAccess {
        SlotAccess { count: AtomicU32::new(0), last_access_micros: AtomicU64::new(0) }
    }
}

impl SlotAccess {
    /// Record a touch. Updates are racy by design (spec.md 5: "Access
    /// counters are updated by readers racily; approximate counts are
    /// acceptable; they inform LRU only").
    pub fn touch(&self) {
        self.count.fetch_add(1, Relaxed);
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_micros() as u64;
        self.last_access_micros.store(now, Relaxed);
    }

    pub fn access_count(&self) -> u32 {
        self.count.load(Relaxed)
    }

    pub fn last_access_micros(&self) -> u64 {
        self.last_access_micros.load(Relaxed)
    }
}

/// Array of per-slot access metadata, one entry per physical slot.
#[derive(Debug, Default)]
pub struct AccessTable {
    slots: Vec<SlotAccess>,
}

impl AccessTable {
    pub fn with_capacity(capacity: usize) -> AccessTable {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, SlotAccess::default);
        AccessTable { slots }
    }

    pub fn grow_to(&mut self, capacity: usize) {
        if self.slots.len() < capacity {
            self.slots.resize_with(capacity, SlotAccess::default);
        }
    }

    pub fn touch(&self, slot: usize) {
        if let Some(entry) = self.slots.get(slot) {
            entry.touch();
        }
    }

    /// Slot with the oldest last-access time, the eviction candidate.
    pub fn least_recently_used(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.access_count() > 0)
            .min_by_key(|(_, s)| s.last_access_micros())
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod cache_test {
    use super::*;

    #[test]
    fn test_touch_increments_count_and_sets_timestamp() {
        let table = AccessTable::with_capacity(4);
        table.touch(1);
        table.touch(1);
        assert_eq!(table.slots[1].access_count(), 2);
        assert!(table.slots[1].last_access_micros() > 0);
    }

    #[test]
    fn test_least_recently_used_picks_oldest_touched() {
        let table = AccessTable::with_capacity(3);
        table.touch(0);
        std::thread::sleep(std::time::Duration::from_micros(10));
        table.touch(1);
        assert_eq!(table.least_recently_used(), Some(0));
    }

    #[test]
    fn test_untouched_slots_are_not_eviction_candidates() {
        let table = AccessTable::with_capacity(3);
        assert_eq!(table.least_recently_used(), None);
    }
}
