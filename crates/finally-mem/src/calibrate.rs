//! Calibration override: an allocator that refuses to grow memory.
//!
//! While installed, a new block or a larger resize is denied immediately and
//! the wrapped allocator never sees it. Frees, shrinks and same-size resizes
//! are forwarded unchanged. Running a cleanup under this override shows
//! whether the preallocated slots and frames cover everything it needs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use finally_core::alloc::{AllocRequest, AllocResult, Allocator};

use crate::heap::Heap;

pub struct FailGrowth {
    inner: Arc<dyn Allocator>,
    rejected: AtomicU64,
}

impl FailGrowth {
    pub fn new(inner: Arc<dyn Allocator>) -> Self {
        Self {
            inner,
            rejected: AtomicU64::new(0),
        }
    }

    /// The allocator non-growth requests are forwarded to.
    pub fn inner(&self) -> &Arc<dyn Allocator> {
        &self.inner
    }

    /// Growth requests denied so far.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl Allocator for FailGrowth {
    fn realloc(&self, req: AllocRequest) -> AllocResult {
        if req.is_growth() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "tracing")]
            tracing::warn!(request = %req, "growth denied during calibration");
            return AllocResult::Denied;
        }
        self.inner.realloc(req)
    }

    fn name(&self) -> &'static str {
        "fail-growth"
    }
}

/// Puts back the allocator a heap had when this guard was created.
///
/// Restores on drop, so every exit path (including unwinding) removes an
/// override installed after the guard was taken. Nested guards restore the
/// exact allocator each one saved.
pub struct AllocatorRestore {
    heap: Heap,
    saved: Option<Arc<dyn Allocator>>,
}

impl AllocatorRestore {
    pub fn save(heap: &Heap) -> Self {
        Self {
            heap: heap.clone(),
            saved: Some(heap.allocator()),
        }
    }

    /// Build the growth-rejecting override around the saved allocator.
    pub fn fail_growth(&self) -> Arc<FailGrowth> {
        let inner = match &self.saved {
            Some(saved) => Arc::clone(saved),
            None => self.heap.allocator(),
        };
        Arc::new(FailGrowth::new(inner))
    }

    /// Restore now instead of at drop.
    pub fn restore(mut self) {
        self.put_back();
    }

    fn put_back(&mut self) {
        if let Some(saved) = self.saved.take() {
            let _removed = self.heap.set_allocator(saved);
            #[cfg(feature = "tracing")]
            tracing::debug!(removed = _removed.name(), "allocator restored");
        }
    }
}

impl Drop for AllocatorRestore {
    fn drop(&mut self) {
        self.put_back();
    }
}
