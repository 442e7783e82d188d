//! Worker pool with dedicated worker threads.
//!
//! Fired jobs are executed away from the caller's async runtime. Each worker
//! owns an OS thread with a single-threaded tokio runtime, pulls
//! [`FiredJob`]s from a bounded channel and reports a [`Completion`] on the
//! channel handed to it at construction. The dispatcher consumes those
//! completions to decide between removal and retry.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_publisher::config::WorkerPoolConfig;
//! use prometheus_publisher::core::WorkerPool;
//!
//! let (done_tx, done_rx) = crossbeam_channel::unbounded();
//! let pool = WorkerPool::new(
//!     WorkerPoolConfig::new().with_worker_count(4),
//!     my_executor,
//!     done_tx,
//! )?;
//! pool.submit(fired)?;
//! let completion = done_rx.recv()?;
//! ```

mod native;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::core::executor::{JobContext, JobOutcome};
use crate::util::serde::JobKey;

pub use native::WorkerPool;

/// Errors that can occur when using a `WorkerPool`.
#[derive(Debug)]
pub enum PoolError {
    /// The hand-off queue is full; no more jobs can be accepted.
    QueueFull,

    /// The pool has been shut down.
    PoolShutdown,

    /// Configuration validation failed.
    InvalidConfig(String),

    /// Internal error (thread spawn failure, channel closed, etc.).
    Internal(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "task queue is full"),
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,

    /// Currently executing jobs.
    pub active_tasks: u64,

    /// Jobs waiting in the hand-off queue.
    pub queued_tasks: u64,

    /// Executions that returned `Completed`.
    pub completed_tasks: u64,

    /// Executions that returned `Retry` or `Failed`, or panicked.
    pub failed_tasks: u64,

    /// Total jobs submitted.
    pub submitted_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
        }
    }
}

/// A due job handed to the pool.
#[derive(Debug, Clone)]
pub struct FiredJob<P> {
    /// The job payload to execute.
    pub payload: P,
    /// Execution context.
    pub ctx: JobContext,
    /// Generation of the stored job this execution belongs to.
    pub generation: u64,
}

/// Result of one execution, reported back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Job key.
    pub key: JobKey,
    /// Generation that was executed.
    pub generation: u64,
    /// Attempt number that was executed.
    pub attempt: u32,
    /// What the executor decided.
    pub outcome: JobOutcome,
}
