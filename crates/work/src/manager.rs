//! Job manager service.

use crate::config::JobManagerConfig;
use crate::error::{JobManagerError, Result, WaitTarget};
use crate::tracker::{JobResults, StateTracker};
use async_trait::async_trait;
use jobmill_core::{
    Job, JobId, WorkArgs, WorkDescriptor, WorkFn, WorkId, WorkItemCompleted, WorkOutcome,
    WorkResult, WorkStatus,
};
use jobmill_execution::{ExecutorPool, WorkFuture};
use serde_json::{Map, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Ids handed back for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// The job's id
    pub job_id: JobId,
    /// Ids of the job's work items, in submission order
    pub work_ids: Vec<WorkId>,
}

/// Job manager service.
///
/// Accepts jobs, runs their work items on a bounded pool and keeps each
/// item's result until the caller collects it.
#[async_trait]
pub trait JobManager: Send + Sync {
    /// Submit every work item of `job`.
    ///
    /// Returns `None` without running anything once shutdown has begun.
    fn submit_job(&self, job: Job) -> Option<Submission>;

    /// Collect and forget the results of every item of a job.
    ///
    /// `Ok(None)` while any item is still pending.
    fn get_results(&self, job_id: &JobId) -> Result<Option<JobResults>>;

    /// Collect and forget the result of one work item.
    ///
    /// `Ok(None)` while the item is still pending.
    fn get_work_result(&self, job_id: &JobId, work_id: &WorkId) -> Result<Option<WorkResult>>;

    /// Current status of a work item.
    fn get_status(&self, job_id: &JobId, work_id: &WorkId) -> Result<WorkStatus>;

    /// Wait until every item of everything, one job, or one work item is
    /// terminal.
    async fn wait(
        &self,
        job_id: Option<&JobId>,
        work_id: Option<&WorkId>,
        timeout: Option<Duration>,
    ) -> Result<()>;

    /// Refuse new jobs, cancel work that has not started and shut the pool
    /// down. With `wait`, returns after started work has finished.
    async fn shutdown(&self, wait: bool);
}

/// [`JobManager`] backed by an [`ExecutorPool`].
pub struct PoolJobManager {
    config: JobManagerConfig,
    pool: ExecutorPool,
    tracker: Arc<StateTracker>,
}

impl PoolJobManager {
    /// Create a manager and start its workers on the current tokio runtime.
    pub fn new(config: JobManagerConfig) -> Result<Self> {
        let pool = ExecutorPool::new(config.pool_config())?;
        let tracker = Arc::new(StateTracker::new(config.event_capacity));

        info!(
            "Job manager {} started with {} workers",
            display_name(&config.name),
            pool.max_workers()
        );

        Ok(Self {
            config,
            pool,
            tracker,
        })
    }

    /// Manager name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Effective worker count.
    pub fn max_workers(&self) -> usize {
        self.pool.max_workers()
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_shutting_down()
    }

    /// Number of work items not yet terminal.
    pub fn pending_count(&self) -> usize {
        self.tracker.pending_count()
    }

    /// Subscribe to work item completion events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkItemCompleted> {
        self.tracker.subscribe()
    }

    /// Build a job from `work_factory(args)` and submit it.
    pub fn submit<F, I>(&self, work_factory: F, args: WorkArgs) -> Option<Submission>
    where
        F: FnOnce(WorkArgs) -> I + Send + 'static,
        I: IntoIterator<Item = WorkDescriptor>,
        I::IntoIter: 'static,
    {
        self.submit_job(Job::new(work_factory).with_args(args))
    }

    /// One work item per element of `arg_list`, each calling
    /// `func(element, **kwargs)`.
    pub fn async_map<F>(
        &self,
        func: F,
        arg_list: impl IntoIterator<Item = Value>,
        kwargs: Map<String, Value>,
    ) -> Option<Submission>
    where
        F: Fn(WorkArgs) -> WorkOutcome + Send + Sync + 'static,
    {
        let func: WorkFn = Arc::new(func);
        let descriptors: Vec<WorkDescriptor> = arg_list
            .into_iter()
            .map(|arg| {
                WorkDescriptor::shared(
                    Arc::clone(&func),
                    WorkArgs::new().with_arg(arg).with_kwargs(kwargs.clone()),
                )
            })
            .collect();

        self.submit(move |_| descriptors, WorkArgs::new())
    }

    /// [`async_map`](Self::async_map), then wait for everything the manager
    /// is running.
    pub async fn map<F>(
        &self,
        func: F,
        arg_list: impl IntoIterator<Item = Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Option<Submission>>
    where
        F: Fn(WorkArgs) -> WorkOutcome + Send + Sync + 'static,
    {
        let Some(submission) = self.async_map(func, arg_list, kwargs) else {
            return Ok(None);
        };
        self.wait(None, None, None).await?;
        Ok(Some(submission))
    }

    fn track_completion(&self, job_id: JobId, work_id: WorkId, future: &WorkFuture) {
        let tracker: Weak<StateTracker> = Arc::downgrade(&self.tracker);
        let registered = future.add_done_callback(move |future| {
            if let Some(tracker) = tracker.upgrade() {
                tracker.complete(&job_id, &work_id, future);
            }
        });
        if let Err(e) = registered {
            error!("Failed to register completion callback: {}", e);
        }
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "(unnamed)"
    } else {
        name
    }
}

#[async_trait]
impl JobManager for PoolJobManager {
    fn submit_job(&self, job: Job) -> Option<Submission> {
        let job_id = job.id.clone();
        if !self.tracker.begin_job(&job_id) {
            warn!(
                "Cannot submit job {} because job manager {} is shutting down",
                job_id,
                display_name(self.name())
            );
            return None;
        }

        let mut work_ids = Vec::new();
        for item in job.iter_work_items() {
            let work_id = item.id.clone();
            work_ids.push(work_id.clone());

            self.tracker.register_pending(&job_id, &work_id);
            match self.pool.submit(item.work_func, item.work_func_args) {
                Ok(future) => {
                    self.tracker
                        .register_future((job_id.clone(), work_id.clone()), future.clone());
                    self.track_completion(job_id.clone(), work_id, &future);
                }
                Err(e) => {
                    // Lost a race with shutdown.
                    warn!("{}-{} was not scheduled: {}", job_id, work_id, e);
                    self.tracker
                        .finalize(&job_id, &work_id, WorkResult::cancelled());
                }
            }
        }

        debug!("Submitted job {} with {} work items", job_id, work_ids.len());
        Some(Submission { job_id, work_ids })
    }

    fn get_results(&self, job_id: &JobId) -> Result<Option<JobResults>> {
        self.tracker.take_job_results(job_id).inspect_err(|e| {
            error!("{}", e);
        })
    }

    fn get_work_result(&self, job_id: &JobId, work_id: &WorkId) -> Result<Option<WorkResult>> {
        self.tracker
            .take_work_result(job_id, work_id)
            .inspect_err(|e| {
                error!("{}", e);
            })
    }

    fn get_status(&self, job_id: &JobId, work_id: &WorkId) -> Result<WorkStatus> {
        self.tracker.status(job_id, work_id).inspect_err(|e| {
            error!("{}", e);
        })
    }

    async fn wait(
        &self,
        job_id: Option<&JobId>,
        work_id: Option<&WorkId>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let target = WaitTarget::from_ids(job_id, work_id).inspect_err(|e| {
            error!("{}", e);
        })?;

        debug!("Waiting for {}", target);
        let settled = self
            .tracker
            .wait_for(&target, timeout, self.config.wait_poll_interval)
            .await;

        match (settled, timeout) {
            (false, Some(timeout)) => {
                let err = JobManagerError::Timeout { target, timeout };
                warn!("{}", err);
                Err(err)
            }
            _ => Ok(()),
        }
    }

    async fn shutdown(&self, wait: bool) {
        info!("Shutting down job manager {}", display_name(self.name()));

        let outstanding = self.tracker.begin_shutdown();
        let mut cancelled = 0;
        for ((job_id, work_id), future) in outstanding {
            if future.cancel() {
                self.tracker
                    .finalize(&job_id, &work_id, WorkResult::cancelled());
                cancelled += 1;
            }
        }
        debug!("Cancelled {} work items that had not started", cancelled);

        self.pool.shutdown(wait).await;
        info!("Job manager {} shut down", display_name(self.name()));
    }
}
