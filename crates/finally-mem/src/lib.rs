#![forbid(unsafe_code)]
//! finally-mem: the managed heap and the storage the cleanup context preallocates.
//!
//! Every managed allocation is a realloc-shaped request to the heap's current
//! [`Allocator`](finally_core::Allocator). Swapping that allocator is how the
//! calibration override is installed, so all slot, frame and buffer growth
//! must go through [`Heap::request`].

pub mod calibrate;
pub mod capped;
pub mod error;
pub mod heap;
pub mod pool;
pub mod stack;
pub mod tracking;

pub use calibrate::{AllocatorRestore, FailGrowth};
pub use capped::CappedAllocator;
pub use error::{is_alloc_failure, Error, Result};
pub use heap::{Heap, SystemAllocator};
pub use pool::OwnedBuf;
pub use stack::{Frame, FrameStack, SlotStack};
pub use tracking::{HeapSnapshot, HeapStats};
