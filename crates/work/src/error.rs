//! Job manager errors.

use jobmill_core::{JobId, WorkId};
use jobmill_execution::ExecutorError;
use std::fmt;
use std::time::Duration;

/// Result alias for job manager operations.
pub type Result<T> = std::result::Result<T, JobManagerError>;

/// What a `wait` call is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitTarget {
    /// Every submitted work item
    All,
    /// Every work item of one job
    Job(JobId),
    /// A single work item
    WorkItem(JobId, WorkId),
}

impl WaitTarget {
    /// Build from the optional ids accepted by `wait`.
    ///
    /// A work id without its job id is rejected.
    pub fn from_ids(job_id: Option<&JobId>, work_id: Option<&WorkId>) -> Result<Self> {
        match (job_id, work_id) {
            (None, None) => Ok(WaitTarget::All),
            (Some(job_id), None) => Ok(WaitTarget::Job(job_id.clone())),
            (Some(job_id), Some(work_id)) => {
                Ok(WaitTarget::WorkItem(job_id.clone(), work_id.clone()))
            }
            (None, Some(_)) => Err(JobManagerError::MissingJobId),
        }
    }
}

impl fmt::Display for WaitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitTarget::All => write!(f, "all jobs"),
            WaitTarget::Job(job_id) => write!(f, "job {}", job_id),
            WaitTarget::WorkItem(job_id, work_id) => write!(f, "job {} work {}", job_id, work_id),
        }
    }
}

/// Contract violations surfaced to the caller.
///
/// Failures inside work items never show up here; they are stored as
/// results with a failed status.
#[derive(Debug, thiserror::Error)]
pub enum JobManagerError {
    /// Job never scheduled, or its results were already collected
    #[error("the job {0} was not scheduled or its results have already been collected")]
    UnknownJob(JobId),

    /// Work item never scheduled, or its result was already collected
    #[error("the job {job_id} work {work_id} was never scheduled or its results have already been collected")]
    UnknownWorkItem {
        /// Requested job
        job_id: JobId,
        /// Requested work item
        work_id: WorkId,
    },

    /// `wait` got a work id but no job id
    #[error("waiting for a work item without specifying the job it belongs to is not supported")]
    MissingJobId,

    /// `wait` ran out of time
    #[error("{target} didn't complete before timeout ({timeout:?})")]
    Timeout {
        /// What was being waited for
        target: WaitTarget,
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// The executor pool could not be created
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}
