//! In-memory job store.

use std::collections::HashMap;

use crate::core::{DelayedJob, JobStore, SchedulerError};
use crate::util::serde::JobKey;

/// In-memory store of pending jobs. Contents are lost on restart.
pub struct InMemoryJobStore<P> {
    max_depth: usize,
    jobs: HashMap<JobKey, DelayedJob<P>>,
}

impl<P> InMemoryJobStore<P> {
    /// Create a new in-memory store with a maximum depth.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            jobs: HashMap::with_capacity(max_depth.min(1024)),
        }
    }
}

impl<P: Send> JobStore<P> for InMemoryJobStore<P> {
    fn upsert(&mut self, job: DelayedJob<P>) -> Result<(), SchedulerError> {
        if !self.jobs.contains_key(&job.key) && self.len() >= self.max_depth() {
            return Err(SchedulerError::QueueFull("max pending jobs reached".into()));
        }
        self.jobs.insert(job.key.clone(), job);
        Ok(())
    }

    fn remove(&mut self, key: &JobKey) -> Result<Option<DelayedJob<P>>, SchedulerError> {
        Ok(self.jobs.remove(key))
    }

    fn get(&self, key: &JobKey) -> Option<&DelayedJob<P>> {
        self.jobs.get(key)
    }

    fn pending(&self) -> Vec<DelayedJob<P>>
    where
        P: Clone,
    {
        let mut jobs: Vec<_> = self.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.key.cmp(&b.key)));
        jobs
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }
}
