#![forbid(unsafe_code)]
//! finally-core: shared types for the guaranteed-cleanup protocol.
//!
//! Only interfaces and plain data live here. The managed heap, slot/frame
//! stacks and the calibration override are in `finally-mem`; the suspendable
//! context, preallocation driver and orchestrator are in `finally-exec`.

pub mod alloc;
pub mod budget;
pub mod config;
pub mod error;
pub mod id;
pub mod outcome;
pub mod prelude;

pub use alloc::{AllocRequest, AllocResult, Allocator};
pub use budget::{ResourceBudget, ValidBudget, INTERNAL_CALL_FRAMES};
pub use config::FinallyConfig;
pub use error::{ActionError, Error, Result};
pub use outcome::Outcome;
