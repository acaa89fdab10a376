/// Execution contexts for blocking file I/O.
///
/// ```text
/// WorkerPool:      [queue] --> N OS threads, each job holds its thread start to finish
/// LightweightPool: unbounded tasks --> few carrier threads, blocking sections unmount
/// ```

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::error::{StoreError, StoreResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of OS threads for blocking work.
///
/// Jobs beyond `size` wait in an unbounded queue rather than being rejected,
/// so concurrency is capped at the thread count. Dropping the pool closes the
/// queue; threads exit once the remaining jobs drain.
pub struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> io::Result<Self> {
        let size = size.max(1);
        let (tx, rx) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);

        for i in 0..size {
            let rx = rx.clone();
            let worker = thread::Builder::new()
                .name(format!("dlbench-worker-{}", i))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("Worker {} job panicked", i);
                        }
                    }
                    debug!("Worker {} exiting, queue closed", i);
                })?;
            workers.push(worker);
        }

        info!("Worker pool started: {} threads", size);
        Ok(Self { tx, workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Jobs waiting for a free thread.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    /// Queue a job without waiting for it.
    pub fn execute<F>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(f)).map_err(|_| StoreError::WorkerLost)
    }

    /// Run `f` on a pool thread and await its result without blocking the caller.
    pub async fn run<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        self.execute(move || {
            let _ = done_tx.send(f());
        })?;
        done_rx.await.map_err(|_| StoreError::WorkerLost)
    }
}

/// Cheap tasks multiplexed onto a few carrier threads.
///
/// Each call gets its own task; spawning is unbounded. Blocking sections run
/// under `block_in_place`, which hands the carrier's other tasks to a fresh
/// carrier while the call blocks. That hand-off draws on the runtime's
/// blocking-thread allowance; once it is used up, blocking sections keep
/// their carrier pinned and the tasks queued behind it wait. Long blocking
/// calls here therefore degrade the pool instead of failing.
pub struct LightweightPool {
    runtime: Option<Runtime>,
    carriers: usize,
}

impl LightweightPool {
    pub fn new(carriers: usize) -> io::Result<Self> {
        let carriers = carriers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(carriers)
            .thread_name("dlbench-carrier")
            .enable_all()
            .build()?;
        info!("Lightweight pool started: {} carrier threads", carriers);
        Ok(Self {
            runtime: Some(runtime),
            carriers,
        })
    }

    pub fn carriers(&self) -> usize {
        self.carriers
    }

    /// Run a blocking call on its own lightweight task.
    pub async fn run_blocking<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let runtime = self.runtime.as_ref().ok_or(StoreError::WorkerLost)?;
        let task = runtime.spawn(async move { tokio::task::block_in_place(f) });
        task.await.map_err(|e| {
            error!("Lightweight task failed: {}", e);
            StoreError::WorkerLost
        })
    }
}

impl Drop for LightweightPool {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which is not allowed from async context.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
