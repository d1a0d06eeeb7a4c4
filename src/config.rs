//! Top-level configuration for opening a [crate::Lattice]: file paths,
//! the licensed node cap, and WAL tuning knobs. Following the pack's
//! setter-method convention, with optional TOML loading via `serde` +
//! `toml` for callers that want to externalize these knobs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{err_at, wal, Result};

/// Node cap suggested for an unlicensed evaluation install. Never baked
/// into [crate::Lattice] itself — callers choose.
pub const DEFAULT_EVAL_CAP: usize = 25_000;
/// Node cap suggested for the free tier.
pub const FREE_TIER_CAP: usize = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store_path: PathBuf,
    pub wal_path: PathBuf,
    /// Required at construction time (spec.md 9's open question: the
    /// cap should never be a hardcoded constant).
    pub node_cap: usize,
    pub device_id: u64,
    /// Keep the whole node array resident in a bounded RAM cache backed
    /// by the larger on-disk file, rather than mapping it wholesale.
    pub cache_mode: bool,
    pub fsync: bool,
    pub batch_min: usize,
    pub batch_max: usize,
    pub batch_window_millis: u64,
}

impl Config {
    pub fn new(store_path: impl Into<PathBuf>, wal_path: impl Into<PathBuf>, node_cap: usize) -> Config {
        Config {
            store_path: store_path.into(),
            wal_path: wal_path.into(),
            node_cap,
            device_id: 0,
            cache_mode: false,
            fsync: true,
            batch_min: wal::DEFAULT_BATCH_MIN,
            batch_max: wal::DEFAULT_BATCH_MAX,
            batch_window_millis: wal::DEFAULT_BATCH_WINDOW.as_millis() as u64,
        }
    }

    pub fn set_device_id(&mut self, device_id: u64) -> &mut Self {
        self.device_id = device_id;
        self
    }

    pub fn set_cache_mode(&mut self, cache_mode: bool) -> &mut Self {
        self.cache_mode = cache_mode;
        self
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

    pub fn set_batch_window_millis(&mut self, millis: u64) -> &mut Self {
        self.batch_window_millis = millis;
        self
    }

    /// Parse a TOML document into a `Config`.
    pub fn from_toml(text: &str) -> Result<Config> {
        err_at!(InvalidPath, toml::from_str(text))
    }

    pub(crate) fn wal_config(&self) -> wal::Config {
        let mut c = wal::Config::new(&self.wal_path);
        c.set_fsync(self.fsync);
        c.set_batch_bounds(self.batch_min, self.batch_max);
        c.set_batch_window(std::time::Duration::from_millis(self.batch_window_millis));
        c
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    #[test]
    fn test_new_uses_wal_defaults() {
        let config = Config::new("/tmp/a.store", "/tmp/a.wal", DEFAULT_EVAL_CAP);
        assert_eq!(config.node_cap, DEFAULT_EVAL_CAP);
        assert_eq!(config.batch_min, wal::DEFAULT_BATCH_MIN);
        assert_eq!(config.batch_max, wal::DEFAULT_BATCH_MAX);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = Config::new("/tmp/b.store", "/tmp/b.wal", FREE_TIER_CAP);
        config.set_device_id(7).set_cache_mode(true);
        let text = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed.node_cap, FREE_TIER_CAP);
        assert_eq!(parsed.device_id, 7);
        assert!(parsed.cache_mode);
    }
}
