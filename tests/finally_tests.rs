//! Invocation semantics: result precedence and exactly-once cleanup.

use finally::{ActionError, Error, Finally, Heap, ResourceBudget, Scope};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type ActionResult<T> = std::result::Result<T, ActionError>;

fn finally() -> Finally {
    Finally::new(Heap::system())
}

fn budget() -> ResourceBudget {
    ResourceBudget::new(16, 4)
}

#[test]
fn test_success_passes_value_through() {
    let cleanups = AtomicUsize::new(0);
    let seen = Mutex::new(None);

    let value = finally()
        .run_with(
            budget(),
            || Ok(String::from("payload")),
            |_scope: &mut Scope<'_>, failure: Option<&ActionError>| {
                cleanups.fetch_add(1, Ordering::SeqCst);
                *seen.lock().unwrap() = Some(failure.is_some());
                Ok(())
            },
        )
        .expect("invocation failed");

    assert_eq!(value, "payload");
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), Some(false));
}

#[test]
fn test_main_failure_is_forwarded_then_returned() {
    let cleanups = AtomicUsize::new(0);
    let forwarded = Mutex::new(String::new());

    let err = finally()
        .run_with(
            budget(),
            || -> ActionResult<u32> { Err("disk full".into()) },
            |_scope: &mut Scope<'_>, failure: Option<&ActionError>| {
                cleanups.fetch_add(1, Ordering::SeqCst);
                *forwarded.lock().unwrap() = failure.map(|e| e.to_string()).unwrap_or_default();
                Ok(())
            },
        )
        .unwrap_err();

    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(*forwarded.lock().unwrap(), "disk full");
    assert!(matches!(err, Error::MainAction(_)));
    assert_eq!(err.main_error().unwrap().to_string(), "disk full");
}

#[test]
fn test_cleanup_failure_wins_after_success() {
    let err = finally()
        .run_with(
            budget(),
            || Ok(7),
            |_scope: &mut Scope<'_>, _failure: Option<&ActionError>| Err("flush failed".into()),
        )
        .unwrap_err();

    assert!(err.is_cleanup_failure());
    assert_eq!(err.cleanup_error().unwrap().to_string(), "flush failed");
}

#[test]
fn test_cleanup_failure_wins_after_main_failure() {
    let err = finally()
        .run_with(
            budget(),
            || -> ActionResult<()> { Err("main broke".into()) },
            |_scope: &mut Scope<'_>, failure: Option<&ActionError>| {
                assert!(failure.is_some());
                Err("cleanup broke".into())
            },
        )
        .unwrap_err();

    assert_eq!(err.cleanup_error().unwrap().to_string(), "cleanup broke");
    assert!(err.main_error().is_none());
}

#[test]
fn test_main_runs_on_calling_thread() {
    // Not Send: main stays on the caller's thread.
    let calls = Cell::new(0);
    finally()
        .run_with(
            budget(),
            || {
                calls.set(calls.get() + 1);
                Ok(())
            },
            |_scope: &mut Scope<'_>, _failure: Option<&ActionError>| Ok(()),
        )
        .unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_zero_or_negative_budgets_are_rejected_up_front() {
    let runs = AtomicUsize::new(0);
    for (slots, frames, name) in [
        (0, 4, "min_stack_slots"),
        (-3, 4, "min_stack_slots"),
        (4, 0, "min_call_frames"),
        (4, -1, "min_call_frames"),
    ] {
        let err = finally()
            .run_with(
                ResourceBudget::new(slots, frames),
                || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                |_scope: &mut Scope<'_>, _failure: Option<&ActionError>| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .unwrap_err();
        match err {
            Error::InvalidArgument { name: got, .. } => assert_eq!(got, name),
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cleanup_suspension_is_reported() {
    let err = finally()
        .run_with(
            budget(),
            || Ok(()),
            |scope: &mut Scope<'_>, _failure: Option<&ActionError>| {
                // Comes back with ContextClosed once the orchestrator closes us.
                let resumed = scope.suspend();
                assert!(matches!(resumed, Err(Error::ContextClosed)));
                Ok(())
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::CleanupSuspended));
    assert!(err.is_cleanup_failure());
}

#[test]
fn test_panics_are_captured() {
    let err = finally()
        .run_with(
            budget(),
            || Ok(()),
            |_scope: &mut Scope<'_>, _failure: Option<&ActionError>| -> ActionResult<()> {
                panic!("boom in cleanup")
            },
        )
        .unwrap_err();
    assert_eq!(
        err.cleanup_error().unwrap().to_string(),
        "cleanup action panicked: boom in cleanup"
    );

    let cleanups = AtomicUsize::new(0);
    let err = finally()
        .run_with(
            budget(),
            || -> ActionResult<()> { panic!("boom in main") },
            |_scope: &mut Scope<'_>, failure: Option<&ActionError>| {
                cleanups.fetch_add(1, Ordering::SeqCst);
                assert!(failure.unwrap().to_string().contains("boom in main"));
                Ok(())
            },
        )
        .unwrap_err();
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert!(matches!(err, Error::MainAction(_)));
}

#[test]
fn test_scope_locals_and_nested_calls() {
    finally()
        .run_with(
            ResourceBudget::new(8, 3),
            || Ok(()),
            |scope: &mut Scope<'_>, _failure: Option<&ActionError>| {
                scope.push("outer")?;
                let inner_depth = scope.call(|inner| {
                    inner.push(1)?;
                    inner.push(2)?;
                    assert_eq!(inner.locals().len(), 3);
                    inner.call(|deepest| Ok(deepest.depth()))
                })?;
                assert_eq!(inner_depth, 3);
                // Locals pushed by the callee are gone.
                assert_eq!(scope.locals().len(), 1);
                assert_eq!(scope.local(0).and_then(|v| v.as_str()), Some("outer"));
                assert_eq!(scope.depth(), 1);
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_heap_is_released_after_each_invocation() {
    let heap = Heap::system();
    let finally = Finally::new(heap.clone());
    for _ in 0..3 {
        finally
            .run_with(
                budget(),
                || Ok(()),
                |scope: &mut Scope<'_>, _failure: Option<&ActionError>| {
                    scope.push(serde_json::json!({"closed": true}))?;
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(heap.stats().live_bytes(), 0);
    }
    assert!(heap.stats().peak_bytes() > 0);
}
