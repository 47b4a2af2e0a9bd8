//! Execution layer - bounded executor pool and future handles.

#![warn(missing_docs)]

pub mod error;
pub mod future;
pub mod pool;
pub mod scheduler;

pub use error::{AbortedError, ExecutorError, PanicError, Result};
pub use future::{DoneCallback, FutureOutcome, SharedError, WorkFuture};
pub use pool::ExecutorPool;
pub use scheduler::{normalize_max_workers, ExecutorFlavor, PoolConfig};
