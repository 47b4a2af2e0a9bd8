//! Completion notifications.

use crate::id::{JobId, WorkId};
use crate::status::WorkStatus;
use crate::Time;
use serde::{Deserialize, Serialize};

/// Emitted once per finalized work item (success, failure or cancellation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemCompleted {
    /// Owning job
    pub job_id: JobId,

    /// The finalized item
    pub work_id: WorkId,

    /// Terminal status
    pub status: WorkStatus,

    /// When it was finalized
    pub timestamp: Time,
}

impl WorkItemCompleted {
    /// Create a new event stamped now.
    pub fn new(job_id: JobId, work_id: WorkId, status: WorkStatus) -> Self {
        Self {
            job_id,
            work_id,
            status,
            timestamp: chrono::Utc::now(),
        }
    }
}
