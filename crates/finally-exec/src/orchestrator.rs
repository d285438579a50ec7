//! Orchestrator: run a main action, then its cleanup in a prepared context.
//!
//! One invocation walks these phases:
//!
//! ```text
//! Validated -> ContextCreated -> Preallocated -> MainRan -> CleanupResumed
//!   -> CleanupFailed | CleanupSucceeded -> Merged -> Done
//! ```
//!
//! and stops at `Failed` when the budget is invalid or preallocation does not
//! reach its suspend point. Result precedence: a cleanup failure (including a
//! cleanup that tried to suspend) replaces whatever the main action produced;
//! otherwise the main action's value or error is returned as is.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use serde::Serialize;

use finally_core::alloc::Allocator;
use finally_core::budget::{ResourceBudget, ValidBudget};
use finally_core::config::FinallyConfig;
use finally_core::error::{ActionError, Error, Result};
use finally_core::id::InvocationId;
use finally_core::outcome::Outcome;
use finally_mem::{AllocatorRestore, FailGrowth, Heap};

use crate::context::{ActionPanicked, Context, Resumed};
use crate::driver::{self, DriverExit, DriverPlan, DriverSuspender, ResumeValue};
use crate::metrics::InvocationSummary;
use crate::scope::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Validated,
    ContextCreated,
    Preallocated,
    MainRan,
    CleanupResumed,
    CleanupFailed,
    CleanupSucceeded,
    Merged,
    Done,
    Failed,
}

fn enter(_id: InvocationId, _phase: Phase) {
    #[cfg(feature = "tracing")]
    tracing::trace!(invocation = %_id, phase = ?_phase, "phase");
}

/// Runs main/cleanup pairs against one heap with one default budget.
#[derive(Clone)]
pub struct Finally {
    heap: Heap,
    cfg: FinallyConfig,
}

impl Finally {
    pub fn new(heap: Heap) -> Self {
        Self {
            heap,
            cfg: FinallyConfig::default(),
        }
    }

    /// Uses a capped heap when the config sets one, the global heap otherwise.
    pub fn from_config(cfg: FinallyConfig) -> Self {
        let heap = match cfg.heap_cap_bytes {
            Some(cap) => Heap::capped(cap),
            None => Heap::global().clone(),
        };
        Self { heap, cfg }
    }

    pub fn with_budget(mut self, budget: ResourceBudget) -> Self {
        self.cfg.min_stack_slots = budget.min_stack_slots;
        self.cfg.min_call_frames = budget.min_call_frames;
        self.cfg.calibrate = budget.calibrate;
        self
    }

    /// Native stack of the cleanup context: `base + frames * per_frame` bytes.
    pub fn with_stack_bytes(mut self, base: usize, per_frame: usize) -> Self {
        self.cfg.base_stack_bytes = base;
        self.cfg.frame_stack_bytes = per_frame;
        self
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn budget(&self) -> ResourceBudget {
        self.cfg.budget()
    }

    pub fn config(&self) -> &FinallyConfig {
        &self.cfg
    }

    /// Run `main`, then `cleanup`, with the default budget.
    pub fn run<T, M, C>(&self, main: M, cleanup: C) -> Result<T>
    where
        M: FnOnce() -> std::result::Result<T, ActionError>,
        C: FnOnce(&mut Scope<'_>, Option<&ActionError>) -> std::result::Result<(), ActionError>
            + Send,
    {
        self.run_with(self.budget(), main, cleanup)
    }

    /// Run `main`, then `cleanup`, with an explicit budget.
    pub fn run_with<T, M, C>(&self, budget: ResourceBudget, main: M, cleanup: C) -> Result<T>
    where
        M: FnOnce() -> std::result::Result<T, ActionError>,
        C: FnOnce(&mut Scope<'_>, Option<&ActionError>) -> std::result::Result<(), ActionError>
            + Send,
    {
        let id = InvocationId::next();
        let budget = match budget.validate() {
            Ok(b) => b,
            Err(e) => {
                enter(id, Phase::Failed);
                return Err(e);
            }
        };
        enter(id, Phase::Validated);

        // Taken before the context exists; dropping it restores the allocator.
        let restore = budget.calibrate().then(|| AllocatorRestore::save(&self.heap));
        let calibration = restore.as_ref().map(AllocatorRestore::fail_growth);

        let settled = self.drive(id, &budget, calibration.clone(), main, cleanup);

        if let Some(restore) = restore {
            restore.restore();
        }

        let result = match settled {
            Ok(settled) => {
                let merged = merge(settled);
                enter(id, Phase::Merged);
                enter(id, Phase::Done);
                merged
            }
            Err(e) if e.is_cleanup_failure() => {
                enter(id, Phase::Merged);
                enter(id, Phase::Done);
                Err(e)
            }
            Err(e) => Err(e),
        };

        let rejected = calibration.as_ref().map_or(0, |c| c.rejected());
        InvocationSummary::new(id, &budget, rejected, &result).emit();
        result
    }

    fn drive<T, M, C>(
        &self,
        id: InvocationId,
        budget: &ValidBudget,
        calibration: Option<Arc<FailGrowth>>,
        main: M,
        cleanup: C,
    ) -> Result<Settled<T>>
    where
        M: FnOnce() -> std::result::Result<T, ActionError>,
        C: FnOnce(&mut Scope<'_>, Option<&ActionError>) -> std::result::Result<(), ActionError>
            + Send,
    {
        let frames = budget.driver_frames();
        let plan = DriverPlan {
            frames,
            slots: budget.stack_slots(),
            calibration: calibration.map(|c| c as Arc<dyn Allocator>),
        };
        let stack_bytes = self.cfg.context_stack_bytes(frames);
        let heap = self.heap.clone();

        thread::scope(|s| {
            let mut ctx = Context::spawn(
                s,
                stack_bytes,
                move |first: ResumeValue, suspender: &DriverSuspender| {
                    driver::run(heap, plan, cleanup, first, suspender)
                },
            )?;
            enter(id, Phase::ContextCreated);

            match ctx.resume(None) {
                Ok(Resumed::Suspended(())) => enter(id, Phase::Preallocated),
                Ok(Resumed::Completed(DriverExit::Setup(msg))) | Ok(Resumed::Panicked(msg)) => {
                    enter(id, Phase::Failed);
                    return Err(Error::Setup(msg));
                }
                Ok(Resumed::Completed(_)) => {
                    enter(id, Phase::Failed);
                    return Err(Error::Setup(
                        "preallocation completed without suspending".into(),
                    ));
                }
                Err(e) => {
                    enter(id, Phase::Failed);
                    return Err(Error::Setup(e.to_string()));
                }
            }

            let (value, failure) = protected(main).split();
            enter(id, Phase::MainRan);

            let resumed = ctx.resume(failure);
            enter(id, Phase::CleanupResumed);
            let main_error = settle(id, resumed);
            ctx.close();

            main_error.map(|main_error| Settled { value, main_error })
        })
    }
}

/// What is left once the cleanup succeeded.
struct Settled<T> {
    value: Option<T>,
    main_error: Option<ActionError>,
}

fn merge<T>(settled: Settled<T>) -> Result<T> {
    match settled {
        Settled {
            main_error: Some(e),
            ..
        } => Err(Error::MainAction(e)),
        Settled {
            value: Some(value),
            main_error: None,
        } => Ok(value),
        Settled {
            value: None,
            main_error: None,
        } => Err(Error::Setup(
            "main action failure was not handed back by the cleanup context".into(),
        )),
    }
}

/// Run the main action, capturing both errors and panics.
fn protected<T>(main: impl FnOnce() -> std::result::Result<T, ActionError>) -> Outcome<T> {
    match panic::catch_unwind(AssertUnwindSafe(main)) {
        Ok(result) => result.into(),
        Err(payload) => Outcome::Failure(Box::new(ActionPanicked::new("main", &*payload))),
    }
}

/// Turn the second resume into the pending main error, or the cleanup failure
/// that replaces it.
fn settle(id: InvocationId, resumed: Result<Resumed<(), DriverExit>>) -> Result<Option<ActionError>> {
    let report = match resumed? {
        Resumed::Completed(DriverExit::Finished(report)) => report,
        Resumed::Suspended(()) => {
            enter(id, Phase::CleanupFailed);
            return Err(Error::CleanupSuspended);
        }
        Resumed::Panicked(message) => {
            enter(id, Phase::CleanupFailed);
            return Err(Error::CleanupAction(Box::new(ActionPanicked {
                action: "cleanup",
                message,
            })));
        }
        Resumed::Completed(DriverExit::Closed) => return Err(Error::ContextClosed),
        Resumed::Completed(DriverExit::Setup(msg)) => return Err(Error::Setup(msg)),
    };

    #[cfg(feature = "tracing")]
    tracing::trace!(
        invocation = %id,
        frames_high_water = report.frames_high_water,
        frame_capacity = report.frame_capacity,
        slot_capacity = report.slot_capacity,
        "cleanup finished"
    );

    match report.result {
        Ok(()) => {
            enter(id, Phase::CleanupSucceeded);
            Ok(report.main_error)
        }
        Err(e) => {
            enter(id, Phase::CleanupFailed);
            #[cfg(feature = "tracing")]
            {
                if let Some(lost) = &report.main_error {
                    tracing::debug!(invocation = %id, main_error = %lost, "main action error discarded");
                }
            }
            Err(Error::CleanupAction(e))
        }
    }
}

/// Run `main`, then `cleanup`, on the process-wide heap.
///
/// Returns `main`'s value when both succeed. Otherwise returns exactly one
/// error: the cleanup's if it failed, the main action's if not. A failing
/// main action's error is passed to `cleanup` before being returned.
pub fn run_with_cleanup<T, M, C>(main: M, cleanup: C, budget: ResourceBudget) -> Result<T>
where
    M: FnOnce() -> std::result::Result<T, ActionError>,
    C: FnOnce(&mut Scope<'_>, Option<&ActionError>) -> std::result::Result<(), ActionError> + Send,
{
    Finally::new(Heap::global().clone()).run_with(budget, main, cleanup)
}
