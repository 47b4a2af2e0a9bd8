//! jobmill core data models.
//!
//! Jobs, work items, identifiers and the status/result vocabulary shared by
//! the executor pool and the job manager.

#![warn(missing_docs)]

mod id;
mod job;
mod work_item;
mod status;
mod event;

pub use id::{CoreError, JobId, WorkId, WorkKey, JOB_ID_PREFIX, WORK_ID_PREFIX};
pub use job::{Job, WorkItems};
pub use work_item::{WorkArgs, WorkDescriptor, WorkError, WorkFn, WorkItem, WorkOutcome};
pub use status::{
    describe_error, WorkResult, WorkStatus, RESULT_CANCELLED_ITEM, RESULT_FAILED_PREFIX,
    RESULT_KEY, RESULT_SUCCESSFUL_ITEM,
};
pub use event::WorkItemCompleted;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
