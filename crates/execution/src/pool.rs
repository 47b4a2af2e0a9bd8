//! Bounded executor pool.
//!
//! `max_workers` worker tasks pull submitted work from one FIFO queue, so
//! with a single worker items run strictly in submission order.

use crate::error::{AbortedError, ExecutorError, PanicError, Result};
use crate::future::{FutureOutcome, SharedError, WorkFuture};
use crate::scheduler::{ExecutorFlavor, PoolConfig};
use jobmill_core::{WorkArgs, WorkFn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct QueuedWork {
    future: WorkFuture,
    func: WorkFn,
    args: WorkArgs,
}

type SharedQueue = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedWork>>>;

/// Pool of workers running submitted callables.
pub struct ExecutorPool {
    config: PoolConfig,
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedWork>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutorPool {
    /// Start the pool's workers on the current tokio runtime.
    pub fn new(config: PoolConfig) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| ExecutorError::NoRuntime)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let queue: SharedQueue = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..config.max_workers.get())
            .map(|index| handle.spawn(worker_loop(index, Arc::clone(&queue), config.flavor)))
            .collect();

        info!(
            "Executor pool started with {} {:?} workers",
            config.max_workers, config.flavor
        );

        Ok(Self {
            config,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// Number of workers.
    pub fn max_workers(&self) -> usize {
        self.config.max_workers.get()
    }

    /// Execution flavor.
    pub fn flavor(&self) -> ExecutorFlavor {
        self.config.flavor
    }

    /// Queue `func(args)` for execution. Never waits for the callable.
    pub fn submit(&self, func: WorkFn, args: WorkArgs) -> Result<WorkFuture> {
        let future = WorkFuture::new();
        let work = QueuedWork {
            future: future.clone(),
            func,
            args,
        };

        let sender = lock(&self.sender);
        let sender = sender.as_ref().ok_or(ExecutorError::ShutDown)?;
        sender.send(work).map_err(|_| ExecutorError::ShutDown)?;

        Ok(future)
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        lock(&self.sender).is_none()
    }

    /// Stop accepting work. Already queued work still runs unless its future
    /// was cancelled. With `wait`, returns once every worker has drained.
    pub async fn shutdown(&self, wait: bool) {
        drop(lock(&self.sender).take());

        let workers = std::mem::take(&mut *lock(&self.workers));
        if !wait {
            debug!("Executor pool shut down without waiting for {} workers", workers.len());
            return;
        }

        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Executor worker ended abnormally: {}", e);
            }
        }
        debug!("Executor pool drained");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn worker_loop(index: usize, queue: SharedQueue, flavor: ExecutorFlavor) {
    debug!("Executor worker {} started", index);

    loop {
        let next = {
            let mut receiver = queue.lock().await;
            receiver.recv().await
        };
        let Some(work) = next else {
            break;
        };

        if !work.future.set_running() {
            // Cancelled while queued.
            continue;
        }

        let outcome = run(flavor, work.func, work.args).await;
        work.future.set_outcome(outcome);
    }

    debug!("Executor worker {} stopped", index);
}

async fn run(flavor: ExecutorFlavor, func: WorkFn, args: WorkArgs) -> FutureOutcome {
    match flavor {
        ExecutorFlavor::Blocking => match tokio::task::spawn_blocking(move || func(args)).await {
            Ok(outcome) => outcome.map_err(SharedError::from),
            Err(e) if e.is_panic() => Err(Arc::new(PanicError::from_payload(e.into_panic()))),
            Err(_) => Err(Arc::new(AbortedError)),
        },
        ExecutorFlavor::Inline => match panic::catch_unwind(AssertUnwindSafe(|| func(args))) {
            Ok(outcome) => outcome.map_err(SharedError::from),
            Err(payload) => Err(Arc::new(PanicError::from_payload(payload))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobmill_core::WorkOutcome;
    use serde_json::json;
    use std::time::Duration;

    fn shared<F>(f: F) -> WorkFn
    where
        F: Fn(WorkArgs) -> WorkOutcome + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    #[test]
    fn requires_a_runtime() {
        assert!(matches!(
            ExecutorPool::new(PoolConfig::new().with_max_workers(1)),
            Err(ExecutorError::NoRuntime)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_submitted_work() {
        let pool = ExecutorPool::new(PoolConfig::new().with_max_workers(2)).unwrap();

        let future = pool
            .submit(
                shared(|args| Ok(json!({ "double": args.arg(0).and_then(|v| v.as_i64()).unwrap_or(0) * 2 }))),
                WorkArgs::new().with_arg(21),
            )
            .unwrap();

        future.finished().await;
        assert_eq!(future.result().unwrap().unwrap(), json!({ "double": 42 }));
        pool.shutdown(true).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn errors_and_panics_are_contained() {
        for flavor in [ExecutorFlavor::Blocking, ExecutorFlavor::Inline] {
            let pool = ExecutorPool::new(
                PoolConfig::new().with_max_workers(1).with_flavor(flavor),
            )
            .unwrap();

            let failing = pool
                .submit(shared(|_| Err("bad input".into())), WorkArgs::new())
                .unwrap();
            let panicking = pool
                .submit(shared(|_| panic!("kaboom")), WorkArgs::new())
                .unwrap();
            let fine = pool
                .submit(shared(|_| Ok(json!({}))), WorkArgs::new())
                .unwrap();

            fine.finished().await;
            failing.finished().await;
            panicking.finished().await;

            assert_eq!(failing.exception().unwrap().to_string(), "bad input");
            assert!(panicking.exception().unwrap().to_string().contains("kaboom"));
            assert!(fine.exception().is_none());
            pool.shutdown(true).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn single_worker_is_fifo_and_queued_work_cancels() {
        let pool = ExecutorPool::new(PoolConfig::new().with_max_workers(1)).unwrap();
        let sleeper = shared(|_| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(json!({}))
        });

        let first = pool.submit(Arc::clone(&sleeper), WorkArgs::new()).unwrap();
        let second = pool.submit(Arc::clone(&sleeper), WorkArgs::new()).unwrap();

        while !first.running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!first.cancel());
        assert!(second.cancel());

        first.finished().await;
        assert!(first.result().unwrap().is_ok());
        assert!(second.cancelled());
        assert!(second.result().is_none());
        pool.shutdown(true).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn submit_after_shutdown_is_rejected() {
        let pool = ExecutorPool::new(PoolConfig::new().with_max_workers(1)).unwrap();
        pool.shutdown(false).await;

        assert!(pool.is_shutdown());
        assert!(matches!(
            pool.submit(shared(|_| Ok(json!({}))), WorkArgs::new()),
            Err(ExecutorError::ShutDown)
        ));
    }
}
