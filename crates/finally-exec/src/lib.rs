#![forbid(unsafe_code)]
//! finally-exec: run a main action, then a cleanup action that cannot starve.
//!
//! Before the main action runs, a dedicated context is driven to a call depth
//! and slot count chosen by the caller and parked there. The cleanup action
//! later runs inside that prepared context, optionally with an allocator that
//! refuses all growth so undersized budgets show up immediately.

pub mod context;
pub mod driver;
pub mod failpoints;
pub mod metrics;
pub mod orchestrator;
pub mod probe;
pub mod scope;

pub use context::{ActionPanicked, Context, ContextState, Resumed, Suspender};
pub use orchestrator::{run_with_cleanup, Finally, Phase};
pub use probe::{doubling, find_budget, find_call_frames, find_stack_slots};
pub use scope::Scope;
