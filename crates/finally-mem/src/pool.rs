//! Fallible byte buffers accounted through the managed heap.
//!
//! The heap grants the bytes first, then the backing `Vec` is reserved with
//! `try_reserve_exact`. Dropping the buffer sends a free request.

use std::ops::{Deref, DerefMut};

use finally_core::alloc::AllocRequest;

use crate::error::{Error, Result};
use crate::heap::Heap;

/// Owned byte buffer that returns its accounted bytes to the heap on drop.
pub struct OwnedBuf {
    heap: Heap,
    tag: &'static str,
    accounted: usize,
    buf: Vec<u8>,
}

impl OwnedBuf {
    /// Create a new zeroed buffer with `len` bytes.
    pub fn new_zeroed(heap: &Heap, len: usize, tag: &'static str) -> Result<Self> {
        let mut out = Self::with_capacity(heap, len, tag)?;
        out.buf.resize(len, 0u8);
        Ok(out)
    }

    /// Create a buffer with capacity `cap` and length 0.
    pub fn with_capacity(heap: &Heap, cap: usize, tag: &'static str) -> Result<Self> {
        let mut out = Self {
            heap: heap.clone(),
            tag,
            accounted: 0,
            buf: Vec::new(),
        };
        out.try_grow(cap)?;
        Ok(out)
    }

    /// Bytes currently granted by the heap for this buffer.
    pub fn accounted_bytes(&self) -> usize {
        self.accounted
    }

    /// Grow the accounted capacity to `new_cap`, asking the heap first.
    pub fn try_grow(&mut self, new_cap: usize) -> Result<()> {
        if new_cap <= self.accounted {
            return Ok(());
        }
        let req = if self.accounted == 0 {
            AllocRequest::new(self.tag, new_cap)
        } else {
            AllocRequest::resize(self.tag, self.accounted, new_cap)
        };
        self.heap.request(req)?;

        let additional = new_cap.saturating_sub(self.buf.len());
        if let Err(e) = self.buf.try_reserve_exact(additional) {
            // Hand the grant back; the old size stays accounted.
            let _ = self
                .heap
                .request(AllocRequest::resize(self.tag, new_cap, self.accounted));
            return Err(Error::Reserve {
                tag: self.tag,
                bytes: new_cap,
                reason: e.to_string(),
            });
        }
        self.accounted = new_cap;
        Ok(())
    }

    /// Append bytes, growing (at least doubling) when capacity runs out.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<()> {
        let needed = self.buf.len().saturating_add(bytes.len());
        if needed > self.accounted {
            self.try_grow(needed.max(self.accounted.saturating_mul(2)))?;
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Deref for OwnedBuf {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for OwnedBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for OwnedBuf {
    fn drop(&mut self) {
        // NOTE: do not log here to keep drop path fast.
        self.heap.release(self.tag, self.accounted);
        self.accounted = 0;
    }
}
