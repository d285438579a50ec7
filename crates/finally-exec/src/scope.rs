//! What a cleanup action sees of its prepared context.

use serde_json::Value;

use finally_core::error::{ActionError, Error};
use finally_mem::{FrameStack, Heap, SlotStack};

use crate::driver::DriverSuspender;

/// Access to the preallocated frames and slots while a cleanup action runs.
///
/// `push` and `call` use capacity built before the main action ran. Going
/// past it asks the heap for more, which calibration mode denies.
pub struct Scope<'a> {
    frames: &'a mut FrameStack,
    slots: &'a mut SlotStack,
    heap: &'a Heap,
    suspender: &'a DriverSuspender,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        frames: &'a mut FrameStack,
        slots: &'a mut SlotStack,
        heap: &'a Heap,
        suspender: &'a DriverSuspender,
    ) -> Self {
        Self {
            frames,
            slots,
            heap,
            suspender,
        }
    }

    /// The managed heap, for buffers the cleanup needs.
    pub fn heap(&self) -> &Heap {
        self.heap
    }

    /// Store a local.
    pub fn push(&mut self, value: impl Into<Value>) -> finally_mem::Result<()> {
        self.slots.push(value)
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.slots.pop()
    }

    pub fn local(&self, idx: usize) -> Option<&Value> {
        self.slots.get(idx)
    }

    pub fn locals(&self) -> &[Value] {
        self.slots.values()
    }

    /// Run `f` one frame deeper. Locals pushed inside are dropped on return.
    pub fn call<R>(
        &mut self,
        f: impl FnOnce(&mut Scope<'_>) -> Result<R, ActionError>,
    ) -> Result<R, ActionError> {
        self.frames.push("call")?;
        let base = self.slots.len();
        let result = {
            let mut inner = Scope {
                frames: &mut *self.frames,
                slots: &mut *self.slots,
                heap: self.heap,
                suspender: self.suspender,
            };
            f(&mut inner)
        };
        self.slots.truncate(base);
        self.frames.pop();
        result
    }

    /// Current call depth; the cleanup action itself runs at depth 1.
    pub fn depth(&self) -> usize {
        self.frames.depth()
    }

    /// Depth reachable without growing the frame list.
    pub fn frame_capacity(&self) -> usize {
        self.frames.capacity()
    }

    /// Locals storable without growing the slot stack.
    pub fn slot_capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Cleanup actions must not suspend. The orchestrator reports the attempt
    /// as `CleanupSuspended` and closes the context, so this returns
    /// `ContextClosed` once the cleanup gets control back.
    pub fn suspend(&mut self) -> Result<(), Error> {
        self.suspender.suspend(()).map(|_| ())
    }
}
