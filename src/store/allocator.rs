//! Local-id allocator: the low 32 bits of a node's 64-bit id, issued by
//! post-increment within one device.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering::SeqCst};

/// Monotonic local-id source. `next` is persisted in the store header and
/// reconstructed from the maximum observed id on recovery if the header
/// looks stale.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    pub fn new(next: u32) -> IdAllocator {
        IdAllocator { next: AtomicU32::new(next) }
    }

    /// Allocate the next single id.
    pub fn alloc(&self) -> u32 {
        self.next.fetch_add(1, SeqCst)
    }

    /// Atomically reserve a contiguous block of `n` ids; each id in the
    /// returned range may be consumed exactly once by the caller.
    pub fn reserve(&self, n: u32) -> Range<u32> {
        let start = self.next.fetch_add(n, SeqCst);
        start..(start + n)
    }

    pub fn peek_next(&self) -> u32 {
        self.next.load(SeqCst)
    }

    /// Reconcile the allocator's watermark against the highest id
    /// actually observed in the store, used when the persisted header
    /// watermark is stale (`persisted_next < observed_max + 1`).
    pub fn reconcile(&self, observed_max: Option<u32>) {
        if let Some(max) = observed_max {
            let floor = max.saturating_add(1);
            let mut current = self.next.load(SeqCst);
            while current < floor {
                match self.next.compare_exchange(current, floor, SeqCst, SeqCst) {
                    Ok(_) => break,
                    Err(observed) => current = observed,
                }
            }
        }
    }
}

#[cfg(test)]
mod allocator_test {
    use super::*;

    #[test]
    fn test_post_increment_allocation() {
        let alloc = IdAllocator::new(0);
        assert_eq!(alloc.alloc(), 0);
        assert_eq!(alloc.alloc(), 1);
        assert_eq!(alloc.alloc(), 2);
    }

    #[test]
    fn test_reserve_block_is_contiguous_and_atomic() {
        let alloc = IdAllocator::new(10);
        let range = alloc.reserve(5);
        assert_eq!(range, 10..15);
        assert_eq!(alloc.alloc(), 15);
    }

    #[test]
    fn test_reconcile_bumps_stale_watermark() {
        let alloc = IdAllocator::new(2);
        alloc.reconcile(Some(10));
        assert_eq!(alloc.peek_next(), 11);
    }

    #[test]
    fn test_reconcile_does_not_move_watermark_backward() {
        let alloc = IdAllocator::new(20);
        alloc.reconcile(Some(5));
        assert_eq!(alloc.peek_next(), 20);
    }
}
