//! Shared state of a job manager.
//!
//! Every mutation of the pending set, the result store and the future map
//! happens under one lock, so readers always see a consistent picture.

use crate::error::{JobManagerError, Result, WaitTarget};
use jobmill_core::{JobId, WorkId, WorkItemCompleted, WorkKey, WorkResult, WorkStatus};
use jobmill_execution::{FutureOutcome, WorkFuture};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;
use tracing::debug;

/// Results of one job, keyed by work id.
pub type JobResults = HashMap<WorkId, WorkResult>;

/// Work items that have not reached a terminal state, grouped by job.
#[derive(Debug, Default)]
pub struct PendingSet {
    by_job: HashMap<JobId, HashSet<WorkId>>,
    len: usize,
}

impl PendingSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a work item. Returns `false` if it was already pending.
    pub fn insert(&mut self, job_id: &JobId, work_id: &WorkId) -> bool {
        let inserted = self
            .by_job
            .entry(job_id.clone())
            .or_default()
            .insert(work_id.clone());
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Remove a work item. Returns `false` if it was not pending.
    pub fn remove(&mut self, job_id: &JobId, work_id: &WorkId) -> bool {
        let Some(items) = self.by_job.get_mut(job_id) else {
            return false;
        };
        if !items.remove(work_id) {
            return false;
        }
        if items.is_empty() {
            self.by_job.remove(job_id);
        }
        self.len -= 1;
        true
    }

    /// Whether this work item is pending.
    pub fn contains(&self, job_id: &JobId, work_id: &WorkId) -> bool {
        self.by_job
            .get(job_id)
            .is_some_and(|items| items.contains(work_id))
    }

    /// Whether any work item of this job is pending.
    pub fn has_job(&self, job_id: &JobId) -> bool {
        self.by_job.contains_key(job_id)
    }

    /// Number of pending work items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Default)]
struct TrackerState {
    pending: PendingSet,
    results: HashMap<JobId, JobResults>,
    futures: HashMap<WorkKey, WorkFuture>,
    shutting_down: bool,
}

/// Pending set, result store and future map behind a single lock, plus the
/// completion signals fired on finalization.
pub struct StateTracker {
    state: Mutex<TrackerState>,
    changed: Notify,
    events: broadcast::Sender<WorkItemCompleted>,
}

impl StateTracker {
    /// Create a tracker whose event channel buffers `event_capacity` events.
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: Mutex::new(TrackerState::default()),
            changed: Notify::new(),
            events,
        }
    }

    // No user code runs under this lock.
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive a [`WorkItemCompleted`] event for every finalized item.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkItemCompleted> {
        self.events.subscribe()
    }

    /// Open the result slot of a job. Returns `false` once shutting down.
    pub fn begin_job(&self, job_id: &JobId) -> bool {
        let mut state = self.lock();
        if state.shutting_down {
            return false;
        }
        state.results.entry(job_id.clone()).or_default();
        true
    }

    /// Mark a work item pending. Must happen before it reaches the executor.
    pub fn register_pending(&self, job_id: &JobId, work_id: &WorkId) {
        self.lock().pending.insert(job_id, work_id);
    }

    /// Remember the future of a work item until it is finalized.
    pub fn register_future(&self, key: WorkKey, future: WorkFuture) {
        let mut state = self.lock();
        // Already finalized (cancelled by a racing shutdown).
        if !state.pending.contains(&key.0, &key.1) {
            return;
        }
        state.futures.insert(key, future);
    }

    /// Stop accepting jobs and snapshot the futures still outstanding.
    pub fn begin_shutdown(&self) -> Vec<(WorkKey, WorkFuture)> {
        let mut state = self.lock();
        state.shutting_down = true;
        state
            .futures
            .iter()
            .map(|(key, future)| (key.clone(), future.clone()))
            .collect()
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of work items not yet finalized.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Record the terminal result of a work item.
    ///
    /// Returns `false` if the item was already finalized, in which case
    /// nothing changes.
    pub fn finalize(&self, job_id: &JobId, work_id: &WorkId, result: WorkResult) -> bool {
        let mut state = self.lock();
        self.finalize_locked(&mut state, job_id, work_id, result)
    }

    fn finalize_locked(
        &self,
        state: &mut TrackerState,
        job_id: &JobId,
        work_id: &WorkId,
        result: WorkResult,
    ) -> bool {
        if !state.pending.remove(job_id, work_id) {
            return false;
        }
        state.futures.remove(&(job_id.clone(), work_id.clone()));

        let status = result.status();
        state
            .results
            .entry(job_id.clone())
            .or_default()
            .insert(work_id.clone(), result);

        // No subscribers is fine.
        let _ = self
            .events
            .send(WorkItemCompleted::new(job_id.clone(), work_id.clone(), status));
        self.changed.notify_waiters();
        true
    }

    /// Completion callback body: finalize from the future's terminal state.
    pub fn complete(&self, job_id: &JobId, work_id: &WorkId, future: &WorkFuture) {
        let result = if future.cancelled() {
            WorkResult::cancelled()
        } else {
            match future.result() {
                Some(outcome) => result_from_outcome(&outcome),
                None => return,
            }
        };

        match result.failure_message() {
            Some(message) => debug!("{}-{} failed: {}", job_id, work_id, message),
            None => debug!("{}-{} has finished executing", job_id, work_id),
        }
        self.finalize(job_id, work_id, result);
    }

    /// Current status of a work item.
    ///
    /// A future that finished with a failure is finalized on the spot, so
    /// the failure is recorded even before its callback gets to run.
    pub fn status(&self, job_id: &JobId, work_id: &WorkId) -> Result<WorkStatus> {
        let mut state = self.lock();
        let key = (job_id.clone(), work_id.clone());

        if let Some(future) = state.futures.get(&key).cloned() {
            if future.running() {
                return Ok(WorkStatus::Running);
            }
            if future.cancelled() {
                return Ok(WorkStatus::Cancelled);
            }
            if let Some(outcome) = future.result() {
                let result = result_from_outcome(&outcome);
                let status = result.status();
                if status == WorkStatus::Failed {
                    self.finalize_locked(&mut state, job_id, work_id, result);
                }
                return Ok(status);
            }
            return Ok(WorkStatus::Submitted);
        }

        if let Some(result) = state.results.get(job_id).and_then(|items| items.get(work_id)) {
            return Ok(result.status());
        }

        Err(JobManagerError::UnknownWorkItem {
            job_id: job_id.clone(),
            work_id: work_id.clone(),
        })
    }

    /// Hand over and forget every stored result of a job.
    ///
    /// `Ok(None)` while any item of the job is still pending.
    pub fn take_job_results(&self, job_id: &JobId) -> Result<Option<JobResults>> {
        let mut state = self.lock();
        if !state.results.contains_key(job_id) {
            return Err(JobManagerError::UnknownJob(job_id.clone()));
        }
        if state.pending.has_job(job_id) {
            return Ok(None);
        }
        Ok(state.results.remove(job_id))
    }

    /// Hand over and forget the stored result of one work item.
    ///
    /// `Ok(None)` while the item is still pending.
    pub fn take_work_result(&self, job_id: &JobId, work_id: &WorkId) -> Result<Option<WorkResult>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.pending.contains(job_id, work_id) {
            return Ok(None);
        }

        let unknown = || JobManagerError::UnknownWorkItem {
            job_id: job_id.clone(),
            work_id: work_id.clone(),
        };
        let items = state.results.get_mut(job_id).ok_or_else(unknown)?;
        let result = items.remove(work_id).ok_or_else(unknown)?;
        if items.is_empty() && !state.pending.has_job(job_id) {
            state.results.remove(job_id);
        }
        Ok(Some(result))
    }

    /// Whether nothing the target covers is still pending.
    pub fn is_settled(&self, target: &WaitTarget) -> bool {
        let state = self.lock();
        match target {
            WaitTarget::All => state.pending.is_empty(),
            WaitTarget::Job(job_id) => !state.pending.has_job(job_id),
            WaitTarget::WorkItem(job_id, work_id) => !state.pending.contains(job_id, work_id),
        }
    }

    /// Wait until the target is settled.
    ///
    /// Wakes on every finalization and at least once per `poll_interval`.
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_for(
        &self,
        target: &WaitTarget,
        timeout: Option<Duration>,
        poll_interval: Duration,
    ) -> bool {
        // A timeout too large to represent means no deadline.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        loop {
            let notified = self.changed.notified();
            if self.is_settled(target) {
                return true;
            }

            let mut nap = poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                nap = nap.min(deadline - now);
            }

            let _ = tokio::time::timeout(nap, notified).await;
        }
    }
}

/// Stored result for a finished callable's outcome.
///
/// Only a JSON object counts as success; any other value is a failure.
pub fn result_from_outcome(outcome: &FutureOutcome) -> WorkResult {
    match outcome {
        Ok(Value::Object(values)) => WorkResult::success(values.clone()),
        Ok(other) => WorkResult::failure(format!(
            "work callable returned a non-mapping value: {}",
            other
        )),
        Err(err) => WorkResult::from_error(err.as_ref()),
    }
}
