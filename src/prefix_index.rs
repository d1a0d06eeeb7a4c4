//! In-memory structure mapping node-name prefixes to ordered lists of node
//! ids, giving prefix queries `O(k)` cost over matching nodes instead of
//! `O(N)` over the whole store. Rebuilt from the store on open,
//! incrementally maintained on every mutation, and discarded on close.

use std::collections::HashMap;

use crate::store::Store;

/// Prefixes maintained as precomputed buckets regardless of how many
/// nodes currently use them.
pub const WELL_KNOWN_PREFIXES: &[&str] =
    &["ISA_", "PATTERN_", "MATERIAL_", "LEARNING_", "PERFORMANCE_"];

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: u64,
    confidence: f64,
    timestamp: u64,
}

/// Filters applied in the same scan that collects matching ids; never a
/// separate pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct Filters {
    pub min_confidence: Option<f64>,
    pub timestamp_range: Option<(u64, u64)>,
}

impl Filters {
    fn accepts(&self, entry: &Entry) -> bool {
        if let Some(min) = self.min_confidence {
            if entry.confidence < min {
                return false;
            }
        }
        if let Some((lo, hi)) = self.timestamp_range {
            if entry.timestamp < lo || entry.timestamp > hi {
                return false;
            }
        }
        true
    }
}

/// Name-prefix to id-list index, split into a fixed well-known catalogue
/// and an open-ended dynamic one that gains buckets lazily.
#[derive(Debug, Default)]
pub struct PrefixIndex {
    well_known: HashMap<&'static str, Vec<Entry>>,
    dynamic: HashMap<String, Vec<Entry>>,
}

/// Derive the bucket prefix for `name`: a well-known constant if one
/// matches, otherwise everything up to and including the first `_` or
/// `:` separator, or the whole name if neither appears.
fn bucket_prefix(name: &str) -> String {
    for known in WELL_KNOWN_PREFIXES {
        if name.starts_with(known) {
            return (*known).to_string();
        }
    }
    match name.find(['_', ':']) {
        Some(idx) => name[..=idx].to_string(),
        None => name.to_string(),
    }
}

impl PrefixIndex {
    pub fn new() -> PrefixIndex {
        PrefixIndex { well_known: HashMap::new(), dynamic: HashMap::new() }
    }

    fn well_known_key(prefix: &str) -> Option<&'static str> {
        WELL_KNOWN_PREFIXES.iter().copied().find(|known| *known == prefix)
    }

    pub fn insert(&mut self, id: u64, name: &str, confidence: f64, timestamp: u64) {
        let prefix = bucket_prefix(name);
        let entry = Entry { id, confidence, timestamp };
        match Self::well_known_key(&prefix) {
            Some(key) => self.well_known.entry(key).or_default().push(entry),
            None => self.dynamic.entry(prefix).or_default().push(entry),
        }
    }

    pub fn remove(&mut self, id: u64, name: &str) {
        let prefix = bucket_prefix(name);
        match Self::well_known_key(&prefix) {
            Some(key) => {
                if let Some(bucket) = self.well_known.get_mut(key) {
                    bucket.retain(|e| e.id != id);
                }
            }
            None => {
                if let Some(bucket) = self.dynamic.get_mut(&prefix) {
                    bucket.retain(|e| e.id != id);
                    if bucket.is_empty() {
                        self.dynamic.remove(&prefix);
                    }
                }
            }
        }
    }

    /// Look up ids under `prefix`, applying `filters` inline, capped at
    /// `limit`. Order is deterministic (insertion order within the
    /// bucket) but not otherwise semantically meaningful.
    pub fn find(&self, prefix: &str, limit: usize, filters: Filters) -> Vec<u64> {
        let bucket = match Self::well_known_key(prefix) {
            Some(key) => self.well_known.get(key),
            None => self.dynamic.get(prefix),
        };

        #[cfg(debug_assertions)]
        self.debug_cross_check(prefix);

        match bucket {
            Some(entries) => entries
                .iter()
                .filter(|e| filters.accepts(e))
                .map(|e| e.id)
                .take(limit)
                .collect(),
            None => Vec::new(),
        }
    }

    /// A prefix must own exactly one catalogue's bucket, never both.
    #[cfg(debug_assertions)]
    fn debug_cross_check(&self, prefix: &str) {
        let in_well_known = Self::well_known_key(prefix).map_or(false, |k| self.well_known.contains_key(k));
        let in_dynamic = self.dynamic.contains_key(prefix);
        debug_assert!(
            !(in_well_known && in_dynamic),
            "prefix {:?} present in both well-known and dynamic catalogues",
            prefix
        );
    }

    /// Rebuild from scratch by scanning every live node in `store`. Used
    /// on open and whenever the index is known-stale.
    pub fn rebuild(store: &Store) -> PrefixIndex {
        let mut index = PrefixIndex::new();
        for (id, name, confidence, timestamp) in store.iter_live() {
            if let Ok(name) = std::str::from_utf8(&name) {
                index.insert(id, name, confidence, timestamp);
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.well_known.values().map(Vec::len).sum::<usize>()
            + self.dynamic.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod prefix_index_test {
    use super::*;

    #[test]
    fn test_scenario_isa_and_pattern_prefix_counts() {
        let mut index = PrefixIndex::new();
        let names = [
            "ISA_add", "ISA_sub", "ISA_mul", "PATTERN_foo", "PATTERN_bar",
            "MATERIAL_wood", "LEARNING_x", "PERFORMANCE_y", "OTHER_z", "OTHER_w",
        ];
        for (i, name) in names.iter().enumerate() {
            index.insert(i as u64, name, 1.0, i as u64);
        }

        let isa = index.find("ISA_", 100, Filters::default());
        assert_eq!(isa.len(), 3);
        let pattern = index.find("PATTERN_", 100, Filters::default());
        assert_eq!(pattern.len(), 2);
    }

    #[test]
    fn test_remove_clears_entry_from_bucket() {
        let mut index = PrefixIndex::new();
        index.insert(1, "ISA_add", 1.0, 0);
        index.insert(2, "ISA_sub", 1.0, 0);
        index.remove(1, "ISA_add");
        assert_eq!(index.find("ISA_", 10, Filters::default()), vec![2]);
    }

    #[test]
    fn test_dynamic_prefix_discovered_and_removed_bucket_is_dropped() {
        let mut index = PrefixIndex::new();
        index.insert(1, "CUSTOM_thing", 1.0, 0);
        assert_eq!(index.find("CUSTOM_", 10, Filters::default()), vec![1]);
        index.remove(1, "CUSTOM_thing");
        assert!(index.find("CUSTOM_", 10, Filters::default()).is_empty());
        assert!(!index.dynamic.contains_key("CUSTOM_"));
    }

    #[test]
    fn test_min_confidence_filter() {
        let mut index = PrefixIndex::new();
        index.insert(1, "ISA_a", 0.2, 0);
        index.insert(2, "ISA_b", 0.9, 0);
        let filters = Filters { min_confidence: Some(0.5), timestamp_range: None };
        assert_eq!(index.find("ISA_", 10, filters), vec![2]);
    }

    #[test]
    fn test_timestamp_range_filter() {
        let mut index = PrefixIndex::new();
        index.insert(1, "ISA_a", 1.0, 10);
        index.insert(2, "ISA_b", 1.0, 50);
        index.insert(3, "ISA_c", 1.0, 90);
        let filters = Filters { min_confidence: None, timestamp_range: Some((20, 60)) };
        assert_eq!(index.find("ISA_", 10, filters), vec![2]);
    }

    #[test]
    fn test_limit_caps_results() {
        let mut index = PrefixIndex::new();
        for i in 0..10 {
            index.insert(i, &format!("ISA_{}", i), 1.0, 0);
        }
        assert_eq!(index.find("ISA_", 3, Filters::default()).len(), 3);
    }

    #[test]
    fn test_name_with_no_separator_is_its_own_bucket() {
        let mut index = PrefixIndex::new();
        index.insert(1, "SOLO", 1.0, 0);
        assert_eq!(index.find("SOLO", 10, Filters::default()), vec![1]);
    }
}
