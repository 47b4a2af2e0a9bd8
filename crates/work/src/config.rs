//! Job manager configuration.

use jobmill_execution::{ExecutorFlavor, PoolConfig};
use std::time::Duration;

/// Default upper bound between two checks of a `wait` condition.
pub const DEFAULT_WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default buffer of the completion notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

const MIN_WAIT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for a [`PoolJobManager`](crate::PoolJobManager).
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Name used in logs
    pub name: String,
    /// Worker count; `0` means the number of available processing units
    pub max_workers: usize,
    /// How workers run callables
    pub flavor: ExecutorFlavor,
    /// Longest time `wait` sleeps before re-checking on its own
    pub wait_poll_interval: Duration,
    /// Completion events buffered per subscriber before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_workers: 0,
            flavor: ExecutorFlavor::default(),
            wait_poll_interval: DEFAULT_WAIT_POLL_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl JobManagerConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set worker count.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set executor flavor.
    pub fn with_flavor(mut self, flavor: ExecutorFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Set the wait poll interval (at least 1ms).
    pub fn with_wait_poll_interval(mut self, interval: Duration) -> Self {
        self.wait_poll_interval = interval.max(MIN_WAIT_POLL_INTERVAL);
        self
    }

    /// Set the event channel capacity (at least 1).
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Pool configuration derived from this one.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new()
            .with_max_workers(self.max_workers)
            .with_flavor(self.flavor)
    }
}
