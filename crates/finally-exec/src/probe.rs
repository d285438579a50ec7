//! Budget search through calibration runs.
//!
//! A calibrated run fails its cleanup with an allocation failure as soon as
//! the cleanup outgrows the prepared context. Trying candidate budgets in
//! increasing order and keeping the first that passes gives a budget that is
//! known to cover that cleanup.

use finally_core::budget::ResourceBudget;
use finally_core::error::{ActionError, Error, Result};
use finally_mem::is_alloc_failure;

use crate::orchestrator::Finally;
use crate::scope::Scope;

/// `start, 2*start, 4*start, ...` up to and including `max`.
pub fn doubling(start: i64, max: i64) -> impl Iterator<Item = i64> {
    let start = start.max(1);
    std::iter::successors(Some(start), move |&n| n.checked_mul(2)).take_while(move |&n| n <= max)
}

/// First candidate under which a calibrated run of the cleanup succeeds.
///
/// A candidate passes when the cleanup succeeds and the heap denied nothing
/// while it ran. The returned budget has calibration switched off. A candidate
/// that fails with anything other than an allocation failure in the cleanup
/// stops the search with that error.
pub fn find_budget<I, F, C>(finally: &Finally, candidates: I, mut make_cleanup: F) -> Result<ResourceBudget>
where
    I: IntoIterator<Item = ResourceBudget>,
    F: FnMut() -> C,
    C: FnOnce(&mut Scope<'_>, Option<&ActionError>) -> std::result::Result<(), ActionError> + Send,
{
    let mut tried = 0usize;
    for candidate in candidates {
        tried += 1;
        let denied_before = finally.heap().stats().denied();
        match finally.run_with(candidate.calibrating(true), || Ok(()), make_cleanup()) {
            // A cleanup that swallowed a denied allocation still outgrew the budget.
            Ok(()) if finally.heap().stats().denied() > denied_before => {
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    min_stack_slots = candidate.min_stack_slots,
                    min_call_frames = candidate.min_call_frames,
                    "budget too small, denial swallowed by cleanup"
                );
            }
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    min_stack_slots = candidate.min_stack_slots,
                    min_call_frames = candidate.min_call_frames,
                    tried,
                    "budget found"
                );
                return Ok(candidate.calibrating(false));
            }
            Err(e) if insufficient(&e) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    min_stack_slots = candidate.min_stack_slots,
                    min_call_frames = candidate.min_call_frames,
                    error = %e,
                    "budget too small"
                );
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::Calibration(format!(
        "none of {tried} candidate budgets was sufficient"
    )))
}

fn insufficient(e: &Error) -> bool {
    e.cleanup_error()
        .map_or(false, |a| is_alloc_failure(a.as_ref()))
}

/// Smallest power-of-two slot count, up to `max_slots`, for a fixed depth.
pub fn find_stack_slots<F, C>(
    finally: &Finally,
    call_frames: i64,
    max_slots: i64,
    make_cleanup: F,
) -> Result<ResourceBudget>
where
    F: FnMut() -> C,
    C: FnOnce(&mut Scope<'_>, Option<&ActionError>) -> std::result::Result<(), ActionError> + Send,
{
    let candidates = doubling(1, max_slots).map(|slots| ResourceBudget::new(slots, call_frames));
    find_budget(finally, candidates, make_cleanup)
}

/// Smallest power-of-two call depth, up to `max_frames`, for a fixed slot count.
pub fn find_call_frames<F, C>(
    finally: &Finally,
    stack_slots: i64,
    max_frames: i64,
    make_cleanup: F,
) -> Result<ResourceBudget>
where
    F: FnMut() -> C,
    C: FnOnce(&mut Scope<'_>, Option<&ActionError>) -> std::result::Result<(), ActionError> + Send,
{
    let candidates =
        doubling(1, max_frames).map(|frames| ResourceBudget::new(stack_slots, frames));
    find_budget(finally, candidates, make_cleanup)
}
