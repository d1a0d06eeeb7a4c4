//! Module `seqlock` implements the lock-free reader / exclusive-writer
//! primitive that gives the store its single-writer, multi-reader
//! concurrency. Unlike [crate::util::Spinlock], which blocks readers out
//! while a writer holds the latch, a seqlock never blocks a reader: the
//! reader instead re-validates its snapshot and retries if a writer raced
//! it.
//!
//! The sequence is even when no writer is active and odd while one is
//! mutating. The even value *is* the version number readers snapshot.

use std::sync::atomic::{AtomicU64, Ordering::Acquire};
use std::{thread, time};

use crate::{err_at, Result};

const READ_RETRY_BUDGET: usize = 64;
const WRITE_SPIN_BUDGET: usize = 64;

/// A single atomic sequence counter guarding some piece of data.
///
/// `SeqLock` owns no data itself; callers pair it with the structure it
/// protects and route every read through [SeqLock::read] and every write
/// through [SeqLock::write].
#[derive(Default)]
pub struct SeqLock {
    sequence: AtomicU64,
}

impl SeqLock {
    pub fn new() -> SeqLock {
        SeqLock { sequence: AtomicU64::new(0) }
    }

    /// Run `body` under the reader protocol: load, wait out any active
    /// writer, call `body`, and retry unless the sequence is unchanged.
    /// Returns [crate::Error::Busy] if the retry budget is exhausted.
    pub fn read<F, T>(&self, mut body: F) -> Result<T>
    where
        F: FnMut() -> T,
    {
        for attempt in 0..READ_RETRY_BUDGET {
            let before = self.wait_even(attempt)?;
            let value = body();
            let after = self.sequence.load(Acquire);
            if before == after {
                return Ok(value);
            }
        }
        err_at!(Busy, msg: "seqlock read exceeded retry budget")
    }

    /// Wait until the sequence is even (no writer active), returning its
    /// value. `attempt` drives an exponential backoff before each poll.
    fn wait_even(&self, attempt: usize) -> Result<u64> {
        for spin in 0..READ_RETRY_BUDGET {
            let seq = self.sequence.load(Acquire);
            if seq % 2 == 0 {
                return Ok(seq);
            }
            if spin == 0 && attempt == 0 {
                thread::yield_now();
            } else {
                thread::sleep(time::Duration::from_micros(1 << spin.min(10)));
            }
        }
        err_at!(Busy, msg: "seqlock read stalled behind active writer")
    }

    /// Acquire the writer side: CAS the sequence from even `s` to `s+1`.
    /// Returns the pre-acquire even value. There is exactly one writer by
    /// convention; a concurrent second writer busy-loops here until the
    /// budget is exhausted and then fails with [crate::Error::Timeout].
    pub fn write_acquire(&self) -> Result<u64> {
        for _ in 0..WRITE_SPIN_BUDGET {
            let s = self.sequence.load(Acquire);
            if s % 2 == 0
                && self
                    .sequence
                    .compare_exchange(s, s + 1, Acquire, Acquire)
                    .is_ok()
            {
                return Ok(s);
            }
            thread::yield_now();
        }
        err_at!(Timeout, msg: "seqlock writer exceeded spin budget")
    }

    /// Release the writer side, publishing `s + 2` as the new version.
    pub fn write_release(&self, s: u64) {
        self.sequence.store(s + 2, std::sync::atomic::Ordering::Release);
    }

    /// Run `body` under the writer protocol, acquiring and releasing
    /// around it. Returns the new published version alongside `body`'s
    /// result.
    pub fn write<F, T>(&self, body: F) -> Result<(u64, T)>
    where
        F: FnOnce() -> T,
    {
        let s = self.write_acquire()?;
        let value = body();
        self.write_release(s);
        Ok((s + 2, value))
    }

    /// Current published version, without participating in either
    /// protocol. Useful for diagnostics only; never treat this as a
    /// validated snapshot.
    pub fn version(&self) -> u64 {
        self.sequence.load(Acquire)
    }
}

#[cfg(test)]
mod seqlock_test {
    use std::sync::{atomic::AtomicU64, Arc};
    use std::thread;

    use super::*;

    #[test]
    fn test_single_writer_read_roundtrip() {
        let lock = SeqLock::new();
        let data = AtomicU64::new(0);

        let (v, ()) = lock.write(|| data.store(42, std::sync::atomic::Ordering::Relaxed)).unwrap();
        assert_eq!(v, 2);

        let got = lock.read(|| data.load(std::sync::atomic::Ordering::Relaxed)).unwrap();
        assert_eq!(got, 42);
        assert_eq!(lock.version(), 2);
    }

    #[test]
    fn test_concurrent_writer_and_readers_never_tear() {
        let lock = Arc::new(SeqLock::new());
        let data = Arc::new(AtomicU64::new(0));

        let w_lock = Arc::clone(&lock);
        let w_data = Arc::clone(&data);
        let writer = thread::spawn(move || {
            for i in 1..=2000u64 {
                w_lock.write(|| w_data.store(i, std::sync::atomic::Ordering::Relaxed)).unwrap();
            }
        });

        let mut readers = vec![];
        for _ in 0..4 {
            let r_lock = Arc::clone(&lock);
            let r_data = Arc::clone(&data);
            readers.push(thread::spawn(move || {
                for _ in 0..2000 {
                    let _ = r_lock.read(|| r_data.load(std::sync::atomic::Ordering::Relaxed));
                }
            }));
        }

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(data.load(std::sync::atomic::Ordering::Relaxed), 2000);
    }

    #[test]
    fn test_write_acquire_release_sequence_is_even_after_release() {
        let lock = SeqLock::new();
        assert_eq!(lock.version(), 0);
        let s = lock.write_acquire().unwrap();
        assert_eq!(s, 0);
        assert_eq!(lock.version() % 2, 1);
        lock.write_release(s);
        assert_eq!(lock.version(), 2);
    }
}
