//! Abstract allocator interface for the managed heap.
//!
//! The concrete allocators (system, capped, calibration override) live in
//! `finally-mem`. Requests are realloc-shaped: a block is described by its
//! previous size (`None` for a fresh block) and the size it should have now
//! (`0` frees it).

use std::fmt;

/// One allocation request as seen by an [`Allocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRequest {
    /// Debug tag for metrics/tracing.
    pub tag: &'static str,
    /// Current size of the block, or `None` when the block does not exist yet.
    pub old_size: Option<usize>,
    /// Requested size. Zero releases the block.
    pub new_size: usize,
}

impl AllocRequest {
    pub const fn new(tag: &'static str, new_size: usize) -> Self {
        Self {
            tag,
            old_size: None,
            new_size,
        }
    }

    pub const fn resize(tag: &'static str, old_size: usize, new_size: usize) -> Self {
        Self {
            tag,
            old_size: Some(old_size),
            new_size,
        }
    }

    pub const fn free(tag: &'static str, old_size: usize) -> Self {
        Self {
            tag,
            old_size: Some(old_size),
            new_size: 0,
        }
    }

    /// A request grows memory when it asks for a non-empty block that is new
    /// or larger than the current one. Frees and shrinks are not growth.
    pub fn is_growth(&self) -> bool {
        self.new_size > 0
            && match self.old_size {
                None => true,
                Some(old) => old < self.new_size,
            }
    }

    /// Bytes this request adds on top of the current block (0 for non-growth).
    pub fn growth_bytes(&self) -> usize {
        self.new_size
            .saturating_sub(self.old_size.unwrap_or_default())
    }
}

impl fmt::Display for AllocRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.old_size {
            None => write!(f, "alloc {} bytes [{}]", self.new_size, self.tag),
            Some(old) if self.new_size == 0 => write!(f, "free {} bytes [{}]", old, self.tag),
            Some(old) => write!(f, "resize {} -> {} bytes [{}]", old, self.new_size, self.tag),
        }
    }
}

/// Answer to an [`AllocRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocResult {
    Granted,
    Denied,
}

impl AllocResult {
    pub fn is_granted(self) -> bool {
        matches!(self, AllocResult::Granted)
    }
}

/// The managed heap's allocation function.
///
/// Implementations must accept every non-growth request: a free or shrink
/// that is denied would leave the caller with no way to release memory.
pub trait Allocator: Send + Sync {
    fn realloc(&self, req: AllocRequest) -> AllocResult;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "allocator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_classification() {
        assert!(AllocRequest::new("t", 8).is_growth());
        assert!(AllocRequest::resize("t", 8, 16).is_growth());
        assert!(!AllocRequest::resize("t", 16, 16).is_growth());
        assert!(!AllocRequest::resize("t", 16, 8).is_growth());
        assert!(!AllocRequest::free("t", 16).is_growth());
        // A zero-sized fresh request never needs memory.
        assert!(!AllocRequest::new("t", 0).is_growth());
    }

    #[test]
    fn test_growth_bytes() {
        assert_eq!(AllocRequest::new("t", 8).growth_bytes(), 8);
        assert_eq!(AllocRequest::resize("t", 8, 20).growth_bytes(), 12);
        assert_eq!(AllocRequest::resize("t", 20, 8).growth_bytes(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(AllocRequest::new("slots", 4).to_string(), "alloc 4 bytes [slots]");
        assert_eq!(AllocRequest::free("slots", 4).to_string(), "free 4 bytes [slots]");
        assert_eq!(
            AllocRequest::resize("slots", 4, 8).to_string(),
            "resize 4 -> 8 bytes [slots]"
        );
    }
}
