//! Local slots and call-frame records of an execution context.
//!
//! Both stacks ask the heap before their capacity grows and keep the capacity
//! when values or frames are popped. Once a context has been driven to a
//! given depth and slot count, staying within those bounds never allocates.

use std::mem::size_of;

use serde_json::Value;

use finally_core::alloc::AllocRequest;

use crate::error::{Error, Result};
use crate::heap::Heap;

const SLOT_TAG: &str = "slots";
const FRAME_TAG: &str = "frames";

/// Minimum slot capacity taken on the first push into an empty stack.
const MIN_SLOT_GROWTH: usize = 8;

fn grow_request(tag: &'static str, old_bytes: usize, new_bytes: usize) -> AllocRequest {
    if old_bytes == 0 {
        AllocRequest::new(tag, new_bytes)
    } else {
        AllocRequest::resize(tag, old_bytes, new_bytes)
    }
}

/// Local-variable slots holding dynamic values.
pub struct SlotStack {
    heap: Heap,
    slots: Vec<Value>,
    /// Capacity granted by the heap, in slots.
    capacity: usize,
}

impl SlotStack {
    pub const SLOT_BYTES: usize = size_of::<Value>();

    pub fn new(heap: Heap) -> Self {
        Self {
            heap,
            slots: Vec::new(),
            capacity: 0,
        }
    }

    /// Make room for at least `additional` more slots. The storage is
    /// materialized now, not on first use.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self.slots.len().saturating_add(additional);
        if needed <= self.capacity {
            return Ok(());
        }
        self.grow_to(needed)
    }

    fn grow_to(&mut self, new_cap: usize) -> Result<()> {
        let old_bytes = self.capacity.saturating_mul(Self::SLOT_BYTES);
        let new_bytes = new_cap.saturating_mul(Self::SLOT_BYTES);
        self.heap.request(grow_request(SLOT_TAG, old_bytes, new_bytes))?;

        let additional = new_cap.saturating_sub(self.slots.len());
        if let Err(e) = self.slots.try_reserve_exact(additional) {
            let _ = self
                .heap
                .request(AllocRequest::resize(SLOT_TAG, new_bytes, old_bytes));
            return Err(Error::Reserve {
                tag: SLOT_TAG,
                bytes: new_bytes,
                reason: e.to_string(),
            });
        }
        self.capacity = new_cap;
        Ok(())
    }

    pub fn push(&mut self, value: impl Into<Value>) -> Result<()> {
        if self.slots.len() == self.capacity {
            let next = self
                .capacity
                .saturating_mul(2)
                .max(MIN_SLOT_GROWTH);
            self.grow_to(next)?;
        }
        self.slots.push(value.into());
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.slots.pop()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.slots.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Value> {
        self.slots.get_mut(idx)
    }

    /// Drop every slot above `len`. Capacity is kept.
    pub fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots usable without another heap request.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn values(&self) -> &[Value] {
        &self.slots
    }
}

impl Drop for SlotStack {
    fn drop(&mut self) {
        self.heap
            .release(SLOT_TAG, self.capacity.saturating_mul(Self::SLOT_BYTES));
        self.capacity = 0;
    }
}

/// One call-frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Depth of this frame, 1 for the outermost.
    pub depth: usize,
    pub tag: &'static str,
}

/// Call-frame records. Grows one frame at a time and never shrinks while alive.
pub struct FrameStack {
    heap: Heap,
    frames: Vec<Frame>,
    capacity: usize,
    high_water: usize,
}

impl FrameStack {
    pub const FRAME_BYTES: usize = size_of::<Frame>();

    pub fn new(heap: Heap) -> Self {
        Self {
            heap,
            frames: Vec::new(),
            capacity: 0,
            high_water: 0,
        }
    }

    pub fn push(&mut self, tag: &'static str) -> Result<()> {
        if self.frames.len() == self.capacity {
            self.extend()?;
        }
        let depth = self.frames.len() + 1;
        self.frames.push(Frame { depth, tag });
        self.high_water = self.high_water.max(depth);
        Ok(())
    }

    fn extend(&mut self) -> Result<()> {
        let old_bytes = self.capacity.saturating_mul(Self::FRAME_BYTES);
        let new_cap = self.capacity + 1;
        let new_bytes = new_cap.saturating_mul(Self::FRAME_BYTES);
        self.heap
            .request(grow_request(FRAME_TAG, old_bytes, new_bytes))?;
        if let Err(e) = self.frames.try_reserve_exact(new_cap - self.frames.len()) {
            let _ = self
                .heap
                .request(AllocRequest::resize(FRAME_TAG, new_bytes, old_bytes));
            return Err(Error::Reserve {
                tag: FRAME_TAG,
                bytes: new_bytes,
                reason: e.to_string(),
            });
        }
        self.capacity = new_cap;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames usable without another heap request.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Deepest depth reached so far.
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}

impl Drop for FrameStack {
    fn drop(&mut self) {
        self.heap
            .release(FRAME_TAG, self.capacity.saturating_mul(Self::FRAME_BYTES));
        self.capacity = 0;
    }
}
