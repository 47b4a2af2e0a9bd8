//! Work items - the atomic unit of scheduled work.

use crate::id::{JobId, WorkId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Error returned by a work callable.
pub type WorkError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a work callable produces. Success values must be JSON objects.
pub type WorkOutcome = Result<Value, WorkError>;

/// A shareable work callable.
pub type WorkFn = Arc<dyn Fn(WorkArgs) -> WorkOutcome + Send + Sync + 'static>;

/// Positional and keyword arguments handed to a callable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkArgs {
    /// Positional arguments, in order
    pub positional: Vec<Value>,
    /// Keyword arguments
    pub keyword: Map<String, Value>,
}

impl WorkArgs {
    /// Empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from positional arguments only.
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            keyword: Map::new(),
        }
    }

    /// Append a positional argument.
    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Replace all keyword arguments.
    pub fn with_kwargs(mut self, keyword: Map<String, Value>) -> Self {
        self.keyword = keyword;
        self
    }

    /// Positional argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Keyword argument by name.
    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }
}

/// A callable paired with its arguments, as yielded by a work factory.
#[derive(Clone)]
pub struct WorkDescriptor {
    /// The callable
    pub func: WorkFn,
    /// Its arguments
    pub args: WorkArgs,
}

impl WorkDescriptor {
    /// Wrap a closure and its arguments.
    pub fn new<F>(func: F, args: WorkArgs) -> Self
    where
        F: Fn(WorkArgs) -> WorkOutcome + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            args,
        }
    }

    /// Reuse an already shared callable.
    pub fn shared(func: WorkFn, args: WorkArgs) -> Self {
        Self { func, args }
    }
}

impl std::fmt::Debug for WorkDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkDescriptor")
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Unit of work the job manager schedules and gets executed.
#[derive(Clone)]
pub struct WorkItem {
    /// Unique identifier
    pub id: WorkId,

    /// Job that spawned this work item
    pub job_id: JobId,

    /// Callable performing the work
    pub work_func: WorkFn,

    /// Arguments passed to `work_func`
    pub work_func_args: WorkArgs,
}

impl WorkItem {
    /// Create a work item for `job_id` out of a descriptor.
    pub fn new(job_id: JobId, descriptor: WorkDescriptor) -> Self {
        Self {
            id: WorkId::new(),
            job_id,
            work_func: descriptor.func,
            work_func_args: descriptor.args,
        }
    }

    /// Tracking key of this item.
    pub fn key(&self) -> (JobId, WorkId) {
        (self.job_id.clone(), self.id.clone())
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("job_id", &self.job_id)
            .field("work_func_args", &self.work_func_args)
            .finish_non_exhaustive()
    }
}
