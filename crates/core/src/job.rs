//! Jobs - logical groups of work items expanded from a work factory.

use crate::id::JobId;
use crate::work_item::{WorkArgs, WorkDescriptor, WorkItem};

type BoxedFactory = Box<dyn FnOnce(WorkArgs) -> Box<dyn Iterator<Item = WorkDescriptor>> + Send>;

/// A logical group of work items to be completed.
///
/// The work factory is called once, with the job's factory arguments, when
/// the job is expanded. It yields a finite sequence of descriptors; the job
/// cannot be expanded twice.
pub struct Job {
    /// Unique identifier
    pub id: JobId,

    /// Ordering hint, not used for scheduling
    pub priority: i32,

    /// User visible name
    pub name: String,

    /// User visible description
    pub description: String,

    work_factory: BoxedFactory,

    work_factory_args: WorkArgs,
}

impl Job {
    /// Create a job around `factory`.
    pub fn new<F, I>(factory: F) -> Self
    where
        F: FnOnce(WorkArgs) -> I + Send + 'static,
        I: IntoIterator<Item = WorkDescriptor>,
        I::IntoIter: 'static,
    {
        Self {
            id: JobId::new(),
            priority: 0,
            name: String::new(),
            description: String::new(),
            work_factory: Box::new(move |args| {
                Box::new(factory(args).into_iter()) as Box<dyn Iterator<Item = WorkDescriptor>>
            }),
            work_factory_args: WorkArgs::default(),
        }
    }

    /// Arguments passed to the factory on expansion.
    pub fn with_args(mut self, args: WorkArgs) -> Self {
        self.work_factory_args = args;
        self
    }

    /// Use a caller supplied id instead of a generated one.
    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    /// Set name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set priority hint.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Expand the job, consuming it.
    pub fn iter_work_items(self) -> WorkItems {
        let Job {
            id,
            work_factory,
            work_factory_args,
            ..
        } = self;

        WorkItems {
            job_id: id,
            inner: work_factory(work_factory_args),
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("work_factory_args", &self.work_factory_args)
            .finish_non_exhaustive()
    }
}

/// Lazy sequence of the work items of one job.
pub struct WorkItems {
    job_id: JobId,
    inner: Box<dyn Iterator<Item = WorkDescriptor>>,
}

impl WorkItems {
    /// Id of the job being expanded.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

impl Iterator for WorkItems {
    type Item = WorkItem;

    fn next(&mut self) -> Option<WorkItem> {
        self.inner
            .next()
            .map(|descriptor| WorkItem::new(self.job_id.clone(), descriptor))
    }
}
