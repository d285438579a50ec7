//! Isolated execution context: a second call stack that can park and resume.
//!
//! The context body runs on its own scoped thread with an explicit stack size.
//! Control is handed back and forth over channels, so exactly one side runs at
//! a time: `resume` blocks until the body either suspends or returns, and
//! `Suspender::suspend` blocks until the next `resume`.
//!
//! Dropping a parked context closes it: the pending `suspend` returns
//! `Error::ContextClosed` and the thread is joined.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, ScopedJoinHandle};

use thiserror::Error;

use finally_core::error::{Error, Result};
use finally_core::id::ContextId;

enum Event<Y, R> {
    Suspended(Y),
    Completed(std::result::Result<R, String>),
}

/// What a `resume` call came back with.
#[derive(Debug)]
pub enum Resumed<Y, R> {
    /// The body parked itself with this value.
    Suspended(Y),
    /// The body returned.
    Completed(R),
    /// The body panicked; carries the panic message.
    Panicked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Spawned, body not started yet.
    Created,
    Suspended,
    /// Body returned or panicked. Cannot be resumed again.
    Dead,
}

/// Handle the body uses to park its context.
pub struct Suspender<Y, V, R> {
    events: Sender<Event<Y, R>>,
    resumes: Receiver<V>,
}

impl<Y, V, R> Suspender<Y, V, R> {
    /// Park the context, handing `value` to the resumer. Returns the value
    /// passed to the next `resume`, or `ContextClosed` if the context is
    /// dropped instead.
    pub fn suspend(&self, value: Y) -> Result<V> {
        self.events
            .send(Event::Suspended(value))
            .map_err(|_| Error::ContextClosed)?;
        self.resumes.recv().map_err(|_| Error::ContextClosed)
    }
}

pub struct Context<'scope, Y, V, R> {
    id: ContextId,
    state: ContextState,
    resumes: Option<Sender<V>>,
    events: Receiver<Event<Y, R>>,
    handle: Option<ScopedJoinHandle<'scope, ()>>,
}

impl<'scope, Y, V, R> Context<'scope, Y, V, R>
where
    Y: Send + 'scope,
    V: Send + 'scope,
    R: Send + 'scope,
{
    /// Create a context whose body starts on the first `resume`, receiving
    /// that resume's value.
    pub fn spawn<'env, F>(
        scope: &'scope thread::Scope<'scope, 'env>,
        stack_bytes: usize,
        body: F,
    ) -> Result<Self>
    where
        F: FnOnce(V, &Suspender<Y, V, R>) -> R + Send + 'scope,
    {
        let id = ContextId::next();
        let (resume_tx, resume_rx) = channel::<V>();
        let (event_tx, event_rx) = channel::<Event<Y, R>>();

        let handle = thread::Builder::new()
            .name(format!("finally-ctx-{}", id.get()))
            .stack_size(stack_bytes)
            .spawn_scoped(scope, move || {
                let first = match resume_rx.recv() {
                    Ok(v) => v,
                    // Dropped before it was ever started.
                    Err(_) => return,
                };
                let suspender = Suspender {
                    events: event_tx,
                    resumes: resume_rx,
                };
                let result = panic::catch_unwind(AssertUnwindSafe(|| body(first, &suspender)))
                    .map_err(|payload| panic_message(&*payload));
                let _ = suspender.events.send(Event::Completed(result));
            })
            .map_err(|e| Error::Setup(format!("spawn context thread: {e}")))?;

        #[cfg(feature = "tracing")]
        tracing::trace!(context = %id, stack_bytes, "context created");

        Ok(Self {
            id,
            state: ContextState::Created,
            resumes: Some(resume_tx),
            events: event_rx,
            handle: Some(handle),
        })
    }

    /// Run the body until it suspends or returns.
    pub fn resume(&mut self, value: V) -> Result<Resumed<Y, R>> {
        if self.state == ContextState::Dead {
            return Err(Error::ContextDead);
        }
        let tx = self.resumes.as_ref().ok_or(Error::ContextClosed)?;
        if tx.send(value).is_err() {
            self.state = ContextState::Dead;
            return Err(Error::ContextClosed);
        }
        match self.events.recv() {
            Ok(Event::Suspended(y)) => {
                self.state = ContextState::Suspended;
                Ok(Resumed::Suspended(y))
            }
            Ok(Event::Completed(result)) => {
                self.state = ContextState::Dead;
                Ok(match result {
                    Ok(r) => Resumed::Completed(r),
                    Err(msg) => Resumed::Panicked(msg),
                })
            }
            Err(_) => {
                self.state = ContextState::Dead;
                Err(Error::ContextClosed)
            }
        }
    }
}

impl<'scope, Y, V, R> Context<'scope, Y, V, R> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Close the context and wait for its thread to finish.
    pub fn close(self) {
        drop(self);
    }
}

impl<'scope, Y, V, R> Drop for Context<'scope, Y, V, R> {
    fn drop(&mut self) {
        // Closing the resume channel wakes a parked body with ContextClosed.
        self.resumes.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(context = %self.id, state = ?self.state, "context closed");
    }
}

/// An action unwound instead of returning.
#[derive(Debug, Error)]
#[error("{action} action panicked: {message}")]
pub struct ActionPanicked {
    pub action: &'static str,
    pub message: String,
}

impl ActionPanicked {
    pub fn new(action: &'static str, payload: &(dyn Any + Send)) -> Self {
        Self {
            action,
            message: panic_message(payload),
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
