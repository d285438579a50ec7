#![forbid(unsafe_code)]
//! finally: run an action, then a cleanup action that is guaranteed the call
//! depth and local slots it asked for.
//!
//! ```no_run
//! use finally::{run_with_cleanup, ActionError, ResourceBudget, Scope};
//!
//! let value = run_with_cleanup(
//!     || Ok(42),
//!     |scope: &mut Scope<'_>, failure: Option<&ActionError>| {
//!         scope.push(failure.is_some())?;
//!         Ok(())
//!     },
//!     ResourceBudget::new(16, 4),
//! )?;
//! assert_eq!(value, 42);
//! # Ok::<(), finally::Error>(())
//! ```

pub use finally_core::prelude::*;
pub use finally_core::budget::{DEFAULT_MIN_CALL_FRAMES, DEFAULT_MIN_STACK_SLOTS};
pub use finally_mem::{
    is_alloc_failure, AllocatorRestore, CappedAllocator, FailGrowth, Heap, HeapSnapshot,
    HeapStats, OwnedBuf, SystemAllocator,
};
pub use finally_exec::{
    doubling, find_budget, find_call_frames, find_stack_slots, run_with_cleanup,
    ActionPanicked, Finally, Phase, Scope,
};

/// Chaos hooks for tests.
#[cfg(feature = "failpoints")]
pub use finally_exec::failpoints;
