//! Resource budget for one guarded invocation.
//!
//! The caller-facing [`ResourceBudget`] uses signed fields so that zero and
//! negative requests can be expressed and rejected; [`ValidBudget`] is what the
//! executor actually works with once validation passed.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of local slots reserved for the cleanup action.
pub const DEFAULT_MIN_STACK_SLOTS: i64 = 100;

/// Default number of call frames preallocated for the cleanup action.
pub const DEFAULT_MIN_CALL_FRAMES: i64 = 10;

/// Frames added on top of the requested minimum: the cleanup action itself is
/// invoked one frame below the driver's outermost level.
pub const INTERNAL_CALL_FRAMES: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBudget {
    /// Local slots the cleanup action can use without growing the slot stack.
    pub min_stack_slots: i64,
    /// Nested calls the cleanup action can make without growing the frame list.
    pub min_call_frames: i64,
    /// Reject every growth allocation while the cleanup action runs.
    pub calibrate: bool,
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self {
            min_stack_slots: DEFAULT_MIN_STACK_SLOTS,
            min_call_frames: DEFAULT_MIN_CALL_FRAMES,
            calibrate: false,
        }
    }
}

impl ResourceBudget {
    pub fn new(min_stack_slots: i64, min_call_frames: i64) -> Self {
        Self {
            min_stack_slots,
            min_call_frames,
            calibrate: false,
        }
    }

    pub fn calibrating(mut self, calibrate: bool) -> Self {
        self.calibrate = calibrate;
        self
    }

    /// Check both minimums are positive.
    pub fn validate(&self) -> Result<ValidBudget> {
        let stack_slots = positive("min_stack_slots", self.min_stack_slots)?;
        let call_frames = positive("min_call_frames", self.min_call_frames)?;
        Ok(ValidBudget {
            stack_slots,
            call_frames,
            calibrate: self.calibrate,
        })
    }
}

fn positive(name: &'static str, value: i64) -> Result<usize> {
    if value <= 0 {
        return Err(Error::InvalidArgument { name, value });
    }
    usize::try_from(value).map_err(|_| Error::InvalidArgument { name, value })
}

/// A budget that passed validation. Immutable for the rest of the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidBudget {
    stack_slots: usize,
    call_frames: usize,
    calibrate: bool,
}

impl ValidBudget {
    pub fn stack_slots(&self) -> usize {
        self.stack_slots
    }

    /// Frames requested by the caller.
    pub fn call_frames(&self) -> usize {
        self.call_frames
    }

    /// Frames the driver builds: the caller's minimum plus the internal frame.
    pub fn driver_frames(&self) -> usize {
        self.call_frames.saturating_add(INTERNAL_CALL_FRAMES)
    }

    pub fn calibrate(&self) -> bool {
        self.calibrate
    }
}
