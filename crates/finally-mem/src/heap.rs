//! The managed heap: a shared handle to a swappable allocator.
//!
//! Clones share the same allocator slot and stats. The slot is read for every
//! request and replaced by `set_allocator`, which is how the calibration
//! override is installed and removed.

use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use finally_core::alloc::{AllocRequest, AllocResult, Allocator};

use crate::capped::CappedAllocator;
use crate::error::{Error, Result};
use crate::pool::OwnedBuf;
use crate::tracking::HeapStats;

/// Grants every request. Backing memory is reserved fallibly by the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn realloc(&self, _req: AllocRequest) -> AllocResult {
        AllocResult::Granted
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

struct HeapInner {
    alloc: RwLock<Arc<dyn Allocator>>,
    stats: HeapStats,
}

#[derive(Clone)]
pub struct Heap {
    inner: Arc<HeapInner>,
}

static GLOBAL: Lazy<Heap> = Lazy::new(Heap::system);

impl Heap {
    pub fn new(alloc: Arc<dyn Allocator>) -> Self {
        Self {
            inner: Arc::new(HeapInner {
                alloc: RwLock::new(alloc),
                stats: HeapStats::new(),
            }),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemAllocator))
    }

    pub fn capped(capacity_bytes: usize) -> Self {
        Self::new(Arc::new(CappedAllocator::new(capacity_bytes)))
    }

    /// Process-wide heap used when no explicit heap is given.
    pub fn global() -> &'static Heap {
        &GLOBAL
    }

    /// Current allocator.
    pub fn allocator(&self) -> Arc<dyn Allocator> {
        let slot = self
            .inner
            .alloc
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slot)
    }

    /// Replace the allocator, returning the previous one.
    pub fn set_allocator(&self, alloc: Arc<dyn Allocator>) -> Arc<dyn Allocator> {
        let mut slot = self
            .inner
            .alloc
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        #[cfg(feature = "tracing")]
        tracing::trace!(from = slot.name(), to = alloc.name(), "allocator swapped");
        std::mem::replace(&mut *slot, alloc)
    }

    /// Send one request to the current allocator.
    pub fn request(&self, req: AllocRequest) -> Result<()> {
        // Clone out of the lock so the allocator may itself touch the heap.
        let alloc = self.allocator();
        let result = alloc.realloc(req);
        self.inner.stats.record(&req, result);
        if result.is_granted() {
            Ok(())
        } else {
            Err(Error::AllocFailed {
                tag: req.tag,
                bytes: req.new_size,
            })
        }
    }

    /// Release `bytes` previously granted under `tag`. Frees cannot fail.
    pub fn release(&self, tag: &'static str, bytes: usize) {
        if bytes == 0 {
            return;
        }
        let _ = self.request(AllocRequest::free(tag, bytes));
    }

    pub fn alloc_zeroed(&self, len: usize, tag: &'static str) -> Result<OwnedBuf> {
        OwnedBuf::new_zeroed(self, len, tag)
    }

    pub fn alloc_with_capacity(&self, cap: usize, tag: &'static str) -> Result<OwnedBuf> {
        OwnedBuf::with_capacity(self, cap, tag)
    }

    pub fn stats(&self) -> &HeapStats {
        &self.inner.stats
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("allocator", &self.allocator().name())
            .field("stats", &self.stats().snapshot())
            .finish()
    }
}
