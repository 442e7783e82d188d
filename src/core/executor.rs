//! Job execution traits and payload abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::util::serde::JobKey;

/// Marker trait for serializable job payloads.
///
/// All payloads must be Send + Sync for cross-thread execution,
/// and Serialize + Deserialize for persistence in job store backends.
pub trait TaskPayload: Send + Sync + Clone + Serialize + DeserializeOwned + 'static {}

/// Blanket implementation: any type meeting the requirements is a TaskPayload.
impl<T> TaskPayload for T where T: Send + Sync + Clone + Serialize + DeserializeOwned + 'static {}

/// Execution context handed to the executor with each fired job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    /// Key the job was enqueued under.
    pub key: JobKey,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Attempt ceiling configured on the dispatcher.
    pub max_attempts: u32,
    /// Instant the job was due.
    pub fire_at: DateTime<Utc>,
}

impl JobContext {
    /// Whether a `Retry` outcome would exhaust the job.
    #[must_use]
    pub const fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// What the dispatcher should do after an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Done; drop the job.
    Completed,
    /// Transient failure; run again after backoff if attempts remain.
    Retry(String),
    /// Terminal failure; drop the job.
    Failed(String),
}

/// Abstraction for executing a fired job.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_publisher::core::{JobContext, JobExecutor, JobOutcome};
///
/// #[derive(Clone)]
/// struct Echo;
///
/// #[async_trait]
/// impl JobExecutor<String> for Echo {
///     async fn execute(&self, payload: String, _ctx: JobContext) -> JobOutcome {
///         println!("{payload}");
///         JobOutcome::Completed
///     }
/// }
/// ```
#[async_trait]
pub trait JobExecutor<P>: Send + Sync + Clone + 'static
where
    P: TaskPayload,
{
    /// Execute a job payload.
    ///
    /// Runs on a worker thread inside that worker's own single-threaded
    /// tokio runtime, so provider I/O never blocks request handling.
    async fn execute(&self, payload: P, ctx: JobContext) -> JobOutcome;
}
