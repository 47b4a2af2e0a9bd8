//! Worker budget and executor flavor.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// How a worker runs the callables it picks up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorFlavor {
    /// Run on tokio's blocking thread pool; suits blocking or CPU-bound work
    #[default]
    Blocking,
    /// Run directly on the worker task; only for short, non-blocking callables
    Inline,
}

/// Pool configuration.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Max callables running at once
    pub max_workers: NonZeroUsize,
    /// Execution flavor
    pub flavor: ExecutorFlavor,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: normalize_max_workers(0),
            flavor: ExecutorFlavor::default(),
        }
    }
}

impl PoolConfig {
    /// Create a new config sized to the machine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max workers. `0` means the number of available processing units.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = normalize_max_workers(max_workers);
        self
    }

    /// Set execution flavor.
    pub fn with_flavor(mut self, flavor: ExecutorFlavor) -> Self {
        self.flavor = flavor;
        self
    }
}

/// Turn a requested worker count into a usable one.
///
/// `0` falls back to the available parallelism, or 1 when that cannot be
/// determined.
pub fn normalize_max_workers(requested: usize) -> NonZeroUsize {
    NonZeroUsize::new(requested).unwrap_or_else(|| {
        std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
    })
}
