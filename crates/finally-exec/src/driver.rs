//! Preallocation driver: the body of the cleanup context.
//!
//! First run: recurse `frames` times, pushing a frame record before each
//! descent, reserve `slots` locals at the bottom and suspend there. At that
//! point `frames` native frames and frame records are live at once, so the
//! frame list and the thread stack have been grown to that depth.
//!
//! Second run (resume): unwind the recursion (frame capacity is kept),
//! install the calibration allocator if one was given, then run the cleanup
//! action one frame below the outermost level with the resume value, which is
//! the main action's failure if it had one.

use std::hint::black_box;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use finally_core::alloc::Allocator;
use finally_core::error::ActionError;
use finally_mem::{FrameStack, Heap, SlotStack};

use crate::context::{ActionPanicked, Suspender};
use crate::scope::Scope;

/// Value handed to the context on resume: the main action's failure, if any.
pub type ResumeValue = Option<ActionError>;

pub type DriverSuspender = Suspender<(), ResumeValue, DriverExit>;

/// What the driver prepares before parking.
pub struct DriverPlan {
    /// Frames to build, including the internal one.
    pub frames: usize,
    /// Local slots to reserve.
    pub slots: usize,
    /// Installed on the heap right before the cleanup action starts.
    pub calibration: Option<Arc<dyn Allocator>>,
}

#[derive(Debug)]
pub struct CleanupReport {
    pub result: Result<(), ActionError>,
    /// Main action failure forwarded at resume, handed back to the orchestrator.
    pub main_error: Option<ActionError>,
    pub frames_high_water: usize,
    pub frame_capacity: usize,
    pub slot_capacity: usize,
}

#[derive(Debug)]
pub enum DriverExit {
    /// Preallocation failed before the suspend point.
    Setup(String),
    /// Closed while parked; the cleanup action never ran.
    Closed,
    Finished(CleanupReport),
}

enum Parked {
    Resumed(ResumeValue),
    Closed,
}

/// Context body. `_first` is the value of the resume that started it.
pub fn run<C>(
    heap: Heap,
    plan: DriverPlan,
    cleanup: C,
    _first: ResumeValue,
    suspender: &DriverSuspender,
) -> DriverExit
where
    C: FnOnce(&mut Scope<'_>, Option<&ActionError>) -> Result<(), ActionError>,
{
    let mut frames = FrameStack::new(heap.clone());
    let mut slots = SlotStack::new(heap.clone());

    let failure = match preallocate(&mut frames, &mut slots, plan.frames, plan.slots, suspender) {
        Ok(Parked::Resumed(failure)) => failure,
        Ok(Parked::Closed) => return DriverExit::Closed,
        Err(e) => return DriverExit::Setup(e.to_string()),
    };

    if let Some(calibration) = plan.calibration {
        heap.set_allocator(calibration);
    }
    crate::fail_point!("resume_cleanup");

    let result = invoke(&mut frames, &mut slots, &heap, suspender, cleanup, failure.as_ref());

    DriverExit::Finished(CleanupReport {
        result,
        main_error: failure,
        frames_high_water: frames.high_water(),
        frame_capacity: frames.capacity(),
        slot_capacity: slots.capacity(),
    })
}

#[inline(never)]
fn preallocate(
    frames: &mut FrameStack,
    slots: &mut SlotStack,
    remaining: usize,
    reserve: usize,
    suspender: &DriverSuspender,
) -> finally_mem::Result<Parked> {
    if remaining > 0 {
        frames.push("preallocate")?;
        // A live local per level keeps each native frame from being folded away.
        let level = black_box([remaining; 4]);
        let parked = preallocate(frames, slots, remaining - 1, reserve, suspender);
        black_box(&level);
        frames.pop();
        return parked;
    }

    slots.reserve(reserve)?;
    crate::fail_point!("preallocate");

    #[cfg(feature = "tracing")]
    tracing::trace!(
        depth = frames.depth(),
        slots = slots.capacity(),
        "preallocated, suspending"
    );

    Ok(match suspender.suspend(()) {
        Ok(failure) => Parked::Resumed(failure),
        Err(_) => Parked::Closed,
    })
}

fn invoke<C>(
    frames: &mut FrameStack,
    slots: &mut SlotStack,
    heap: &Heap,
    suspender: &DriverSuspender,
    cleanup: C,
    failure: Option<&ActionError>,
) -> Result<(), ActionError>
where
    C: FnOnce(&mut Scope<'_>, Option<&ActionError>) -> Result<(), ActionError>,
{
    frames.push("cleanup")?;
    let outcome = {
        let mut scope = Scope::new(frames, slots, heap, suspender);
        panic::catch_unwind(AssertUnwindSafe(|| cleanup(&mut scope, failure)))
    };
    slots.truncate(0);
    frames.pop();
    match outcome {
        Ok(result) => result,
        Err(payload) => Err(Box::new(ActionPanicked::new("cleanup", &*payload))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, Resumed};
    use std::thread;

    const STACK: usize = 512 * 1024;

    fn plan(frames: usize, slots: usize) -> DriverPlan {
        DriverPlan {
            frames,
            slots,
            calibration: None,
        }
    }

    #[test]
    fn test_suspends_once_after_preallocating() {
        let heap = Heap::system();
        let h = heap.clone();
        thread::scope(|s| {
            let mut ctx = Context::spawn(s, STACK, move |first, sus: &DriverSuspender| {
                run(
                    h,
                    plan(5, 20),
                    |scope: &mut Scope<'_>, failure: Option<&ActionError>| {
                        assert!(failure.is_none());
                        assert_eq!(scope.depth(), 1);
                        assert_eq!(scope.frame_capacity(), 5);
                        assert_eq!(scope.slot_capacity(), 20);
                        Ok(())
                    },
                    first,
                    sus,
                )
            })
            .unwrap();

            assert!(matches!(ctx.resume(None), Ok(Resumed::Suspended(()))));
            let live = heap.stats().live_bytes();
            assert_eq!(
                live,
                5 * FrameStack::FRAME_BYTES + 20 * SlotStack::SLOT_BYTES
            );

            match ctx.resume(None).unwrap() {
                Resumed::Completed(DriverExit::Finished(report)) => {
                    assert!(report.result.is_ok());
                    assert_eq!(report.frames_high_water, 5);
                    assert_eq!(report.frame_capacity, 5);
                }
                other => panic!("unexpected: {:?}", other),
            }
        });
        assert_eq!(heap.stats().live_bytes(), 0);
    }

    #[test]
    fn test_zero_frames_still_suspends() {
        let heap = Heap::system();
        thread::scope(|s| {
            let mut ctx = Context::spawn(s, STACK, move |first, sus: &DriverSuspender| {
                run(
                    heap,
                    plan(0, 4),
                    |scope: &mut Scope<'_>, _failure: Option<&ActionError>| {
                        // The cleanup frame itself needs one extra frame record.
                        assert_eq!(scope.depth(), 1);
                        assert_eq!(scope.slot_capacity(), 4);
                        Ok(())
                    },
                    first,
                    sus,
                )
            })
            .unwrap();
            assert!(matches!(ctx.resume(None), Ok(Resumed::Suspended(()))));
            assert!(matches!(
                ctx.resume(None),
                Ok(Resumed::Completed(DriverExit::Finished(_)))
            ));
        });
    }

    #[test]
    fn test_failure_forwarded_and_returned() {
        let heap = Heap::system();
        thread::scope(|s| {
            let mut ctx = Context::spawn(s, STACK, move |first, sus: &DriverSuspender| {
                run(
                    heap,
                    plan(2, 2),
                    |_scope: &mut Scope<'_>, failure: Option<&ActionError>| {
                        assert_eq!(failure.map(|e| e.to_string()).as_deref(), Some("main broke"));
                        Ok(())
                    },
                    first,
                    sus,
                )
            })
            .unwrap();
            assert!(matches!(ctx.resume(None), Ok(Resumed::Suspended(()))));
            match ctx.resume(Some("main broke".into())).unwrap() {
                Resumed::Completed(DriverExit::Finished(report)) => {
                    assert!(report.result.is_ok());
                    assert_eq!(report.main_error.unwrap().to_string(), "main broke");
                }
                other => panic!("unexpected: {:?}", other),
            }
        });
    }

    #[test]
    fn test_capped_heap_fails_setup() {
        let heap = Heap::capped(FrameStack::FRAME_BYTES * 2);
        thread::scope(|s| {
            let mut ctx = Context::spawn(s, STACK, move |first, sus: &DriverSuspender| {
                run(
                    heap,
                    plan(8, 1),
                    |_scope: &mut Scope<'_>, _failure: Option<&ActionError>| Ok(()),
                    first,
                    sus,
                )
            })
            .unwrap();
            match ctx.resume(None).unwrap() {
                Resumed::Completed(DriverExit::Setup(msg)) => assert!(msg.contains("frames")),
                other => panic!("unexpected: {:?}", other),
            }
        });
    }

    #[test]
    fn test_cleanup_panic_is_captured() {
        let heap = Heap::system();
        thread::scope(|s| {
            let mut ctx = Context::spawn(s, STACK, move |first, sus: &DriverSuspender| {
                run(
                    heap,
                    plan(1, 1),
                    |_scope: &mut Scope<'_>, _failure: Option<&ActionError>| -> Result<(), ActionError> {
                        panic!("cleanup exploded")
                    },
                    first,
                    sus,
                )
            })
            .unwrap();
            assert!(matches!(ctx.resume(None), Ok(Resumed::Suspended(()))));
            match ctx.resume(None).unwrap() {
                Resumed::Completed(DriverExit::Finished(report)) => {
                    let err = report.result.unwrap_err();
                    assert_eq!(err.to_string(), "cleanup action panicked: cleanup exploded");
                }
                other => panic!("unexpected: {:?}", other),
            }
        });
    }
}
