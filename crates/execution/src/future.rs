//! Future handles for submitted work.

use crate::error::{ExecutorError, Result};
use serde_json::Value;
use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Error captured from a finished callable.
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

/// What a finished future holds.
pub type FutureOutcome = std::result::Result<Value, SharedError>;

/// Continuation invoked once the future reaches a terminal state.
pub type DoneCallback = Box<dyn FnOnce(&WorkFuture) + Send + 'static>;

#[derive(Debug, Clone)]
enum State {
    Pending,
    Running,
    Finished(FutureOutcome),
    Cancelled,
}

struct Inner {
    state: State,
    callback: Option<DoneCallback>,
    callback_registered: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    done: Notify,
}

/// Handle to a callable submitted to the [`ExecutorPool`](crate::ExecutorPool).
///
/// Cloning yields another handle to the same work.
#[derive(Clone)]
pub struct WorkFuture {
    shared: Arc<Shared>,
}

impl WorkFuture {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: State::Pending,
                    callback: None,
                    callback_registered: false,
                }),
                done: Notify::new(),
            }),
        }
    }

    // Callbacks never run under this lock, so poisoning cannot leave the
    // state half-written.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The callable is executing right now.
    pub fn running(&self) -> bool {
        matches!(self.lock().state, State::Running)
    }

    /// The future was cancelled before it started.
    pub fn cancelled(&self) -> bool {
        matches!(self.lock().state, State::Cancelled)
    }

    /// The callable finished or the future was cancelled.
    pub fn done(&self) -> bool {
        matches!(self.lock().state, State::Finished(_) | State::Cancelled)
    }

    /// Outcome of the callable, once it finished. `None` while pending,
    /// running, or if cancelled.
    pub fn result(&self) -> Option<FutureOutcome> {
        match &self.lock().state {
            State::Finished(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Error raised by the callable, if it finished with one.
    pub fn exception(&self) -> Option<SharedError> {
        match &self.lock().state {
            State::Finished(Err(err)) => Some(Arc::clone(err)),
            _ => None,
        }
    }

    /// Try to cancel. Only succeeds if the callable has not started; returns
    /// `true` if the future is (now) cancelled.
    pub fn cancel(&self) -> bool {
        let callback = {
            let mut inner = self.lock();
            match inner.state {
                State::Pending => {
                    inner.state = State::Cancelled;
                    inner.callback.take()
                }
                State::Cancelled => return true,
                State::Running | State::Finished(_) => return false,
            }
        };
        self.shared.done.notify_waiters();
        if let Some(callback) = callback {
            callback(self);
        }
        true
    }

    /// Register the completion callback. Only one registration is ever
    /// accepted, even after that callback has run.
    ///
    /// If the future is already done the callback runs immediately on the
    /// calling thread; otherwise it runs on the thread that finishes or
    /// cancels the work.
    pub fn add_done_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&WorkFuture) + Send + 'static,
    {
        {
            let mut inner = self.lock();
            if inner.callback_registered {
                return Err(ExecutorError::CallbackAlreadySet);
            }
            inner.callback_registered = true;
            if matches!(inner.state, State::Pending | State::Running) {
                inner.callback = Some(Box::new(callback));
                return Ok(());
            }
        }
        callback(self);
        Ok(())
    }

    /// Wait until the future is done.
    pub async fn finished(&self) {
        loop {
            let notified = self.shared.done.notified();
            if self.done() {
                return;
            }
            notified.await;
        }
    }

    /// Move to `Running`. Fails if the future was cancelled meanwhile.
    pub(crate) fn set_running(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            State::Pending => {
                inner.state = State::Running;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_outcome(&self, outcome: FutureOutcome) {
        let callback = {
            let mut inner = self.lock();
            inner.state = State::Finished(outcome);
            inner.callback.take()
        };
        self.shared.done.notify_waiters();
        if let Some(callback) = callback {
            callback(self);
        }
    }
}

impl std::fmt::Debug for WorkFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.lock().state {
            State::Pending => "pending",
            State::Running => "running",
            State::Finished(Ok(_)) => "finished",
            State::Finished(Err(_)) => "raised",
            State::Cancelled => "cancelled",
        };
        f.debug_struct("WorkFuture").field("state", &state).finish()
    }
}
