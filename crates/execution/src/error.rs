//! Executor errors.

use std::any::Any;

/// Result alias for executor operations.
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Errors raised by the executor pool itself (never by the work it runs).
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The pool must be created from within a tokio runtime
    #[error("no tokio runtime is running; the executor pool must be created inside one")]
    NoRuntime,

    /// Submission after shutdown
    #[error("cannot submit work: the executor pool has been shut down")]
    ShutDown,

    /// A future accepts exactly one completion callback
    #[error("a completion callback is already registered on this future")]
    CallbackAlreadySet,
}

/// A work callable panicked instead of returning.
#[derive(Debug, Clone, thiserror::Error)]
#[error("work callable panicked: {message}")]
pub struct PanicError {
    /// Panic payload rendered as text
    pub message: String,
}

impl PanicError {
    /// Build from a `catch_unwind` / `JoinError::into_panic` payload.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// The worker task running a callable was torn down before it returned.
#[derive(Debug, Clone, thiserror::Error)]
#[error("work callable was aborted before completing")]
pub struct AbortedError;
