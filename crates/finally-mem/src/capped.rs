//! Allocator with a hard byte ceiling.
//!
//! Growth acquires the added bytes with a CAS loop; shrinks and frees give
//! them back. Nothing is held per block, so the request sizes are trusted.

use std::sync::atomic::{AtomicUsize, Ordering};

use finally_core::alloc::{AllocRequest, AllocResult, Allocator};

pub struct CappedAllocator {
    capacity: usize,
    used: AtomicUsize,
}

impl CappedAllocator {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity: capacity_bytes,
            used: AtomicUsize::new(0),
        }
    }

    fn try_acquire(&self, bytes: usize) -> bool {
        loop {
            let cur = self.used.load(Ordering::Relaxed);
            let next = cur.saturating_add(bytes);
            if next > self.capacity {
                return false;
            }
            if self
                .used
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(bytes))
            });
    }

    /// Current usage (advisory).
    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity
    }
}

impl Allocator for CappedAllocator {
    fn realloc(&self, req: AllocRequest) -> AllocResult {
        if req.is_growth() {
            let bytes = req.growth_bytes();
            if self.try_acquire(bytes) {
                return AllocResult::Granted;
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(
                tag = req.tag,
                requested = bytes,
                capacity = self.capacity,
                used = self.used_bytes(),
                "heap cap exceeded"
            );
            return AllocResult::Denied;
        }
        let released = req.old_size.unwrap_or_default().saturating_sub(req.new_size);
        if released > 0 {
            self.release(released);
        }
        AllocResult::Granted
    }

    fn name(&self) -> &'static str {
        "capped"
    }
}
