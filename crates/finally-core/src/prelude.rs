//! Convenient re-exports for downstream crates.

pub use crate::alloc::{AllocRequest, AllocResult, Allocator};
pub use crate::budget::{ResourceBudget, ValidBudget, INTERNAL_CALL_FRAMES};
pub use crate::config::FinallyConfig;
pub use crate::error::{ActionError, Error, Result};
pub use crate::id::{ContextId, InvocationId};
pub use crate::outcome::Outcome;
