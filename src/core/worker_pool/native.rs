//! Native implementation of `WorkerPool` using OS threads.
//!
//! This implementation spawns dedicated OS threads that each have their own
//! single-threaded tokio runtime, so slow provider calls never block the
//! caller's runtime or the dispatcher's timer thread.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on channel recv
//! - **Clean shutdown**: dropping the sender unblocks workers naturally
//! - **Panic isolation**: each execution runs as a spawned task, so a
//!   panicking executor is reported as a failure instead of killing the worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::WorkerPoolConfig;
use crate::core::executor::{JobExecutor, JobOutcome, TaskPayload};

use super::{Completion, FiredJob, PoolCounters, PoolError, PoolStats};

/// Worker pool with dedicated OS threads for job execution.
pub struct WorkerPool<P, E>
where
    P: TaskPayload,
    E: JobExecutor<P>,
{
    /// Pool configuration.
    config: WorkerPoolConfig,

    /// Job sender (to workers). Option allows clean shutdown by dropping.
    task_tx: Mutex<Option<Sender<FiredJob<P>>>>,

    /// Pool statistics counters (lock-free atomics).
    counters: Arc<PoolCounters>,

    /// Shutdown flag (lock-free atomic).
    shutdown: Arc<AtomicBool>,

    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<()>>>,

    _executor: std::marker::PhantomData<E>,
}

impl<P, E> WorkerPool<P, E>
where
    P: TaskPayload,
    E: JobExecutor<P>,
{
    /// Create a new worker pool and start its threads.
    ///
    /// Every execution result is sent on `completions`. The channel
    /// disconnects once all workers have exited.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` for an invalid configuration,
    /// `PoolError::Internal` if a thread cannot be spawned.
    pub fn new(
        config: WorkerPoolConfig,
        executor: E,
        completions: Sender<Completion>,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let (task_tx, task_rx) = bounded::<FiredJob<P>>(config.max_queue_depth);
        let counters = Arc::new(PoolCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let worker = spawn_worker(
                worker_id,
                task_rx.clone(),
                completions.clone(),
                Arc::clone(&counters),
                Arc::clone(&shutdown),
                executor.clone(),
                config.thread_stack_size,
            )?;
            workers.push(worker);
        }

        info!(
            worker_count = config.worker_count,
            max_queue_depth = config.max_queue_depth,
            "worker pool initialized"
        );

        Ok(Self {
            config,
            task_tx: Mutex::new(Some(task_tx)),
            counters,
            shutdown,
            workers: Mutex::new(workers),
            _executor: std::marker::PhantomData,
        })
    }

    /// Hand a due job to the workers without blocking.
    ///
    /// # Errors
    ///
    /// - `PoolError::QueueFull` if the hand-off queue is full
    /// - `PoolError::PoolShutdown` if the pool has been shut down
    pub fn submit(&self, job: FiredJob<P>) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }

        let task_tx_guard = self.task_tx.lock();
        let Some(task_tx) = task_tx_guard.as_ref() else {
            return Err(PoolError::PoolShutdown);
        };

        let key = job.ctx.key.clone();
        match task_tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
                self.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(job = %key, "job submitted to worker pool");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!(job = %key, "worker pool queue is full");
                Err(PoolError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(PoolError::PoolShutdown),
        }
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.worker_count)
    }

    /// Shut down the pool gracefully with timeout.
    ///
    /// Drops the job sender to unblock idle workers, then joins each worker
    /// for up to two seconds. Workers still busy after that are detached.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("shutting down worker pool");

        {
            let mut task_tx = self.task_tx.lock();
            *task_tx = None;
        }

        let mut workers = self.workers.lock();
        let worker_count = workers.len();

        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = std::sync::mpsc::channel();
            let join_thread = thread::spawn(move || {
                let result = worker.join();
                let _ = tx.send(result.is_ok());
            });

            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => debug!(worker_id = idx, "worker joined"),
                Ok(false) => warn!(worker_id = idx, "worker panicked"),
                Err(_) => {
                    warn!(worker_id = idx, "worker did not exit within timeout, detaching");
                    continue;
                }
            }
            let _ = join_thread.join();
        }

        info!(worker_count, "worker pool shut down");
    }
}

impl<P, E> Drop for WorkerPool<P, E>
where
    P: TaskPayload,
    E: JobExecutor<P>,
{
    fn drop(&mut self) {
        // Signal only; joining here can hang on a busy worker.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            let mut task_tx = self.task_tx.lock();
            *task_tx = None;
            debug!("worker pool dropped without explicit shutdown, workers detached");
        }
    }
}

/// Spawn a worker thread.
fn spawn_worker<P, E>(
    worker_id: usize,
    task_rx: Receiver<FiredJob<P>>,
    completions: Sender<Completion>,
    counters: Arc<PoolCounters>,
    shutdown: Arc<AtomicBool>,
    executor: E,
    stack_size: usize,
) -> Result<JoinHandle<()>, PoolError>
where
    P: TaskPayload,
    E: JobExecutor<P>,
{
    thread::Builder::new()
        .name(format!("publish-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "worker thread started");

            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(worker_id, error = %e, "failed to create worker runtime");
                    return;
                }
            };

            // recv fails once the sender is dropped
            while let Ok(job) = task_rx.recv() {
                counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                if shutdown.load(Ordering::Acquire) {
                    debug!(worker_id, "worker shutting down, job left for recovery");
                    break;
                }
                counters.active_tasks.fetch_add(1, Ordering::Relaxed);

                let FiredJob {
                    payload,
                    ctx,
                    generation,
                } = job;
                let key = ctx.key.clone();
                let attempt = ctx.attempt;
                debug!(worker_id, job = %key, attempt, "worker executing job");

                let exec = executor.clone();
                let outcome = rt.block_on(async move {
                    match tokio::spawn(async move { exec.execute(payload, ctx).await }).await {
                        Ok(outcome) => outcome,
                        Err(e) => JobOutcome::Failed(format!("executor panicked: {e}")),
                    }
                });

                counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
                if outcome == JobOutcome::Completed {
                    counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                }

                let completion = Completion {
                    key,
                    generation,
                    attempt,
                    outcome,
                };
                if completions.send(completion).is_err() {
                    debug!(worker_id, "completion receiver gone, exiting");
                    break;
                }
            }

            debug!(worker_id, "worker thread exiting");
        })
        .map_err(|e| PoolError::Internal(format!("failed to spawn worker thread: {e}")))
}
