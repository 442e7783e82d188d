//! Delayed jobs and the store that persists them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;
use crate::util::serde::JobKey;

/// A job waiting for its fire time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedJob<P> {
    /// Idempotency key.
    pub key: JobKey,
    /// Payload handed to the executor.
    pub payload: P,
    /// Instant the job becomes due.
    pub fire_at: DateTime<Utc>,
    /// 1-based attempt the next execution will be.
    pub attempt: u32,
    /// Bumped on every replace or reschedule; timer entries of older
    /// generations are ignored.
    pub generation: u64,
    /// When the job was first enqueued.
    pub enqueued_at: DateTime<Utc>,
}

/// Storage for pending jobs, keyed by [`JobKey`].
///
/// A job stays in the store until its execution reaches a terminal outcome,
/// so a restart re-arms everything that had not finished.
pub trait JobStore<P>: Send {
    /// Insert or replace the job stored under `job.key`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::QueueFull`] when inserting a new key would exceed
    /// [`Self::max_depth`], or a backend error.
    fn upsert(&mut self, job: DelayedJob<P>) -> Result<(), SchedulerError>;

    /// Remove and return the job stored under `key`.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn remove(&mut self, key: &JobKey) -> Result<Option<DelayedJob<P>>, SchedulerError>;

    /// Borrow the job stored under `key`.
    fn get(&self, key: &JobKey) -> Option<&DelayedJob<P>>;

    /// Snapshot of all pending jobs, earliest first.
    fn pending(&self) -> Vec<DelayedJob<P>>
    where
        P: Clone;

    /// Maximum number of jobs.
    fn max_depth(&self) -> usize;

    /// Current number of jobs.
    fn len(&self) -> usize;

    /// Whether the store holds no jobs.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<P: Send> JobStore<P> for Box<dyn JobStore<P>> {
    fn upsert(&mut self, job: DelayedJob<P>) -> Result<(), SchedulerError> {
        (**self).upsert(job)
    }

    fn remove(&mut self, key: &JobKey) -> Result<Option<DelayedJob<P>>, SchedulerError> {
        (**self).remove(key)
    }

    fn get(&self, key: &JobKey) -> Option<&DelayedJob<P>> {
        (**self).get(key)
    }

    fn pending(&self) -> Vec<DelayedJob<P>>
    where
        P: Clone,
    {
        (**self).pending()
    }

    fn max_depth(&self) -> usize {
        (**self).max_depth()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}
