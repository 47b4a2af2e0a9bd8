//! Job management.
//!
//! Accepts jobs, runs their work items on a bounded executor pool, tracks
//! each item's status and hands results back exactly once.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod manager;
pub mod tracker;

pub use config::{JobManagerConfig, DEFAULT_EVENT_CAPACITY, DEFAULT_WAIT_POLL_INTERVAL};
pub use error::{JobManagerError, Result, WaitTarget};
pub use manager::{JobManager, PoolJobManager, Submission};
pub use tracker::{result_from_outcome, JobResults, PendingSet, StateTracker};
