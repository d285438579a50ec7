//! Lightweight live/peak/request tracking for a heap.
//!
//! Keep this cheap: relaxed atomics only, read as an advisory snapshot.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

use finally_core::alloc::{AllocRequest, AllocResult};

#[derive(Default)]
pub struct HeapStats {
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    granted: AtomicU64,
    denied: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeapSnapshot {
    pub live_bytes: usize,
    pub peak_bytes: usize,
    pub granted: u64,
    pub denied: u64,
}

impl HeapStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one answered request.
    pub fn record(&self, req: &AllocRequest, result: AllocResult) {
        if !result.is_granted() {
            self.denied.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.granted.fetch_add(1, Ordering::Relaxed);
        if req.is_growth() {
            let added = req.growth_bytes();
            let used = self
                .live_bytes
                .fetch_add(added, Ordering::AcqRel)
                .saturating_add(added);
            self.record_used(used);
        } else {
            let released = req.old_size.unwrap_or_default().saturating_sub(req.new_size);
            let _ = self
                .live_bytes
                .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |cur| {
                    Some(cur.saturating_sub(released))
                });
        }
    }

    /// Record a new "live bytes" value; updates peak if higher.
    fn record_used(&self, used_bytes: usize) {
        let mut cur = self.peak_bytes.load(Ordering::Relaxed);
        while used_bytes > cur {
            match self.peak_bytes.compare_exchange(
                cur,
                used_bytes,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(
            used_bytes,
            peak = self.peak_bytes.load(Ordering::Relaxed),
            "heap usage"
        );
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes.load(Ordering::Relaxed)
    }

    pub fn denied(&self) -> u64 {
        self.denied.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HeapSnapshot {
        HeapSnapshot {
            live_bytes: self.live_bytes(),
            peak_bytes: self.peak_bytes(),
            granted: self.granted.load(Ordering::Relaxed),
            denied: self.denied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_and_peak() {
        let stats = HeapStats::new();
        stats.record(&AllocRequest::new("a", 100), AllocResult::Granted);
        stats.record(&AllocRequest::resize("a", 100, 300), AllocResult::Granted);
        stats.record(&AllocRequest::resize("a", 300, 50), AllocResult::Granted);
        assert_eq!(stats.live_bytes(), 50);
        assert_eq!(stats.peak_bytes(), 300);

        stats.record(&AllocRequest::free("a", 50), AllocResult::Granted);
        assert_eq!(stats.live_bytes(), 0);
        assert_eq!(stats.peak_bytes(), 300);
    }

    #[test]
    fn test_denied_not_counted_as_live() {
        let stats = HeapStats::new();
        stats.record(&AllocRequest::new("a", 100), AllocResult::Denied);
        let snap = stats.snapshot();
        assert_eq!(snap.live_bytes, 0);
        assert_eq!(snap.denied, 1);
        assert_eq!(snap.granted, 0);
    }
}
