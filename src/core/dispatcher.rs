//! Delayed job dispatcher.
//!
//! Jobs are keyed: enqueueing an existing key replaces its payload and fire
//! time, and cancelling removes it. A timer thread sleeps on a
//! `parking_lot::Condvar` until the earliest job is due (or an enqueue wakes
//! it), then hands the job to the [`WorkerPool`]. A completion thread applies
//! the executor's outcome: drop the job, or re-arm it with exponential
//! backoff while attempts remain.
//!
//! Jobs stay in the [`JobStore`] until they reach a terminal outcome, so a
//! durable store lets [`Dispatcher::start`] re-arm everything that had not
//! finished before a restart.
//!
//! Due times are judged against the injected [`Clock`], the same one the
//! distributor and publish worker read. Sleeps are capped by
//! `max_timer_sleep_ms`, so a clock that jumps forward is noticed within
//! that bound.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DispatcherConfig, WorkerPoolConfig};
use crate::core::executor::{JobContext, JobExecutor, JobOutcome, TaskPayload};
use crate::core::jobs::{DelayedJob, JobStore};
use crate::core::worker_pool::{Completion, FiredJob, PoolError, PoolStats, WorkerPool};
use crate::core::SchedulerError;
use crate::util::clock::Clock;
use crate::util::serde::JobKey;

/// Delay before retrying a hand-off the pool rejected as full.
const POOL_FULL_RETRY: Duration = Duration::from_millis(500);
/// Stale timer entries tolerated beyond twice the live job count.
const TIMER_PRUNE_SLACK: usize = 64;

/// Keyed delayed execution, the seam the distributor and engine use.
pub trait JobDispatcher<P>: Send + Sync {
    /// Schedule `payload` under `key` to run at `fire_at`, replacing any
    /// pending job with the same key. Past instants run immediately.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::QueueFull`] or a backend error from the job store.
    fn enqueue(&self, key: JobKey, payload: P, fire_at: DateTime<Utc>)
        -> Result<(), SchedulerError>;

    /// Remove the pending job under `key`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Backend error from the job store.
    fn cancel(&self, key: &JobKey) -> Result<bool, SchedulerError>;

    /// Whether a job is pending (or executing) under `key`.
    fn is_pending(&self, key: &JobKey) -> bool;

    /// Whether the job under `key` is currently handed to a worker.
    fn is_running(&self, key: &JobKey) -> bool;
}

/// Dispatcher counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    /// Jobs in the store, including executing ones.
    pub pending: usize,
    /// Jobs currently handed to workers.
    pub in_flight: usize,
    /// Worker pool counters.
    pub pool: PoolStats,
}

/// Heap entry; ordered so the earliest `fire_at` pops first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TimerEntry {
    fire_at: DateTime<Utc>,
    generation: u64,
    key: JobKey,
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for the max-heap
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

struct DispatchState<P, S> {
    store: S,
    timers: BinaryHeap<TimerEntry>,
    /// Executing key -> generation handed to the pool.
    in_flight: HashMap<JobKey, u64>,
    /// Keys whose timer fired while a previous run was still executing.
    deferred: HashSet<JobKey>,
    next_generation: u64,
    shutdown: bool,
    _payload: PhantomData<P>,
}

impl<P, S> DispatchState<P, S>
where
    P: TaskPayload,
    S: JobStore<P>,
{
    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn arm(&mut self, job: &DelayedJob<P>) {
        self.timers.push(TimerEntry {
            fire_at: job.fire_at,
            generation: job.generation,
            key: job.key.clone(),
        });
    }

    /// Drop heap entries whose job was cancelled or superseded once they
    /// outnumber live jobs.
    fn prune_timers(&mut self) {
        let live = self.store.len();
        if self.timers.len() <= live.saturating_mul(2) + TIMER_PRUNE_SLACK {
            return;
        }
        let before = self.timers.len();
        let store = &self.store;
        self.timers.retain(|entry| {
            store
                .get(&entry.key)
                .is_some_and(|job| job.generation == entry.generation)
        });
        debug!(before, after = self.timers.len(), "pruned stale timer entries");
    }

    fn recover(&mut self) -> usize {
        let jobs = self.store.pending();
        for job in &jobs {
            self.next_generation = self.next_generation.max(job.generation);
            self.arm(job);
        }
        jobs.len()
    }

    /// Turn a popped timer entry into a fired job, unless it is stale or its
    /// key is already executing.
    fn take_fireable(&mut self, entry: &TimerEntry, max_attempts: u32) -> Option<FiredJob<P>> {
        let job = self.store.get(&entry.key)?;
        if job.generation != entry.generation {
            return None;
        }
        if self.in_flight.contains_key(&entry.key) {
            debug!(job = %entry.key, "job still executing, deferring");
            self.deferred.insert(entry.key.clone());
            return None;
        }
        let fired = FiredJob {
            payload: job.payload.clone(),
            ctx: JobContext {
                key: job.key.clone(),
                attempt: job.attempt,
                max_attempts,
                fire_at: job.fire_at,
            },
            generation: job.generation,
        };
        self.in_flight.insert(entry.key.clone(), entry.generation);
        Some(fired)
    }

    fn is_idle(&self) -> bool {
        self.store.is_empty() && self.in_flight.is_empty()
    }
}

struct Shared<P, S> {
    config: DispatcherConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<DispatchState<P, S>>,
    /// Signalled when the timer heap changes or on shutdown.
    wake: Condvar,
    /// Signalled whenever a job leaves the store or finishes executing.
    idle: Condvar,
}

impl<P, S> Shared<P, S>
where
    P: TaskPayload,
    S: JobStore<P>,
{
    fn on_completion(&self, completion: Completion) {
        let Completion {
            key,
            generation,
            attempt,
            outcome,
        } = completion;
        let mut state = self.state.lock();
        state.in_flight.remove(&key);

        let current = state.store.get(&key).map(|job| job.generation);
        if current == Some(generation) {
            match outcome {
                JobOutcome::Completed => {
                    debug!(job = %key, attempt, "job completed");
                    self.drop_job(&mut state, &key);
                }
                JobOutcome::Failed(reason) => {
                    warn!(job = %key, attempt, %reason, "job failed");
                    self.drop_job(&mut state, &key);
                }
                JobOutcome::Retry(reason) if attempt < self.config.max_attempts => {
                    let delay = self.config.backoff_for(attempt);
                    let next_generation = state.bump_generation();
                    if let Some(mut job) = state.store.get(&key).cloned() {
                        job.attempt = attempt + 1;
                        job.fire_at = self.clock.now()
                            + chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::zero());
                        job.generation = next_generation;
                        match state.store.upsert(job.clone()) {
                            Ok(()) => {
                                state.arm(&job);
                                warn!(
                                    job = %key,
                                    attempt,
                                    next_attempt = job.attempt,
                                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                    %reason,
                                    "job will be retried"
                                );
                            }
                            Err(e) => {
                                warn!(job = %key, error = %e, "failed to persist retry, dropping job");
                                self.drop_job(&mut state, &key);
                            }
                        }
                    }
                }
                JobOutcome::Retry(reason) => {
                    warn!(job = %key, attempt, %reason, "retry attempts exhausted");
                    self.drop_job(&mut state, &key);
                }
            }
        } else {
            debug!(job = %key, generation, "completion for superseded job");
        }

        if state.deferred.remove(&key) {
            if let Some(job) = state.store.get(&key).cloned() {
                state.arm(&job);
            }
        }
        drop(state);
        self.wake.notify_one();
        self.idle.notify_all();
    }

    fn drop_job(&self, state: &mut DispatchState<P, S>, key: &JobKey) {
        if let Err(e) = state.store.remove(key) {
            warn!(job = %key, error = %e, "failed to remove finished job from store");
        }
    }

    fn release_rejected(&self, key: &JobKey, generation: u64, retry: bool) {
        let mut state = self.state.lock();
        state.in_flight.remove(key);
        if retry {
            let fire_at = self.clock.now()
                + chrono::Duration::from_std(POOL_FULL_RETRY)
                    .unwrap_or_else(|_| chrono::Duration::zero());
            state.timers.push(TimerEntry {
                fire_at,
                generation,
                key: key.clone(),
            });
        }
        drop(state);
        self.idle.notify_all();
    }
}

/// Timer-driven dispatcher executing jobs on a [`WorkerPool`].
pub struct Dispatcher<P, S, E>
where
    P: TaskPayload,
    S: JobStore<P> + 'static,
    E: JobExecutor<P>,
{
    shared: Arc<Shared<P, S>>,
    pool: Arc<WorkerPool<P, E>>,
    stop_tx: Mutex<Option<Sender<()>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<P, S, E> Dispatcher<P, S, E>
where
    P: TaskPayload,
    S: JobStore<P> + 'static,
    E: JobExecutor<P>,
{
    /// Start the dispatcher: re-arm every job already in `store`, spawn the
    /// worker pool, the timer thread and the completion thread. `clock`
    /// decides when jobs are due.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] for invalid configuration,
    /// [`SchedulerError::Backend`] if a thread cannot be spawned.
    pub fn start(
        config: DispatcherConfig,
        store: S,
        pool_config: WorkerPoolConfig,
        executor: E,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::Config)?;

        let (done_tx, done_rx) = unbounded::<Completion>();
        let pool = Arc::new(
            WorkerPool::new(pool_config, executor, done_tx).map_err(|e| match e {
                PoolError::InvalidConfig(msg) => SchedulerError::Config(msg),
                other => SchedulerError::Backend(other.to_string()),
            })?,
        );

        let mut state = DispatchState {
            store,
            timers: BinaryHeap::new(),
            in_flight: HashMap::new(),
            deferred: HashSet::new(),
            next_generation: 0,
            shutdown: false,
            _payload: PhantomData,
        };
        let recovered = state.recover();
        if recovered > 0 {
            info!(recovered, "re-armed persisted jobs");
        }

        let shared = Arc::new(Shared {
            config,
            clock,
            state: Mutex::new(state),
            wake: Condvar::new(),
            idle: Condvar::new(),
        });
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let timer = {
            let shared = Arc::clone(&shared);
            let pool = Arc::clone(&pool);
            thread::Builder::new()
                .name("publish-timer".into())
                .spawn(move || run_timer(&shared, &pool))
                .map_err(|e| SchedulerError::Backend(format!("failed to spawn timer: {e}")))?
        };
        let completions = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("publish-completions".into())
                .spawn(move || run_completions(&shared, &done_rx, &stop_rx))
                .map_err(|e| {
                    SchedulerError::Backend(format!("failed to spawn completion thread: {e}"))
                })?
        };

        Ok(Self {
            shared,
            pool,
            stop_tx: Mutex::new(Some(stop_tx)),
            threads: Mutex::new(vec![timer, completions]),
        })
    }

    /// Keys of all pending jobs, earliest first.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<JobKey> {
        self.shared
            .state
            .lock()
            .store
            .pending()
            .into_iter()
            .map(|job| job.key)
            .collect()
    }

    /// The pending job under `key`.
    #[must_use]
    pub fn pending_job(&self, key: &JobKey) -> Option<DelayedJob<P>> {
        self.shared.state.lock().store.get(key).cloned()
    }

    /// Block until no job is pending or executing, or `timeout` elapses.
    /// Returns whether the dispatcher went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.is_idle() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        let (pending, in_flight) = {
            let state = self.shared.state.lock();
            (state.store.len(), state.in_flight.len())
        };
        DispatcherStats {
            pending,
            in_flight,
            pool: self.pool.stats(),
        }
    }

    /// Stop firing jobs and join the dispatcher threads. Pending jobs stay
    /// in the store.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.shared.wake.notify_all();
        info!("shutting down dispatcher");

        let handles: Vec<_> = self.threads.lock().drain(..).collect();
        let mut handles = handles.into_iter();
        // timer first so nothing new reaches the pool
        if let Some(timer) = handles.next() {
            let _ = timer.join();
        }
        self.pool.shutdown();
        self.stop_tx.lock().take();
        for handle in handles {
            let _ = handle.join();
        }
        self.shared.idle.notify_all();
        info!("dispatcher shut down");
    }
}

impl<P, S, E> JobDispatcher<P> for Dispatcher<P, S, E>
where
    P: TaskPayload,
    S: JobStore<P> + 'static,
    E: JobExecutor<P>,
{
    fn enqueue(
        &self,
        key: JobKey,
        payload: P,
        fire_at: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let now = self.shared.clock.now();
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return Err(SchedulerError::Backend("dispatcher is shut down".into()));
            }
            let generation = state.bump_generation();
            let enqueued_at = state.store.get(&key).map_or(now, |job| job.enqueued_at);
            let job = DelayedJob {
                key: key.clone(),
                payload,
                fire_at,
                attempt: 1,
                generation,
                enqueued_at,
            };
            state.store.upsert(job.clone())?;
            state.arm(&job);
            state.prune_timers();
        }
        self.shared.wake.notify_one();
        info!(
            job = %key,
            %fire_at,
            delay_ms = (fire_at - now).num_milliseconds().max(0),
            "job enqueued"
        );
        Ok(())
    }

    fn cancel(&self, key: &JobKey) -> Result<bool, SchedulerError> {
        let removed = {
            let mut state = self.shared.state.lock();
            let removed = state.store.remove(key)?;
            state.prune_timers();
            removed
        };
        if removed.is_some() {
            info!(job = %key, "job cancelled");
            self.shared.idle.notify_all();
        }
        Ok(removed.is_some())
    }

    fn is_pending(&self, key: &JobKey) -> bool {
        self.shared.state.lock().store.get(key).is_some()
    }

    fn is_running(&self, key: &JobKey) -> bool {
        self.shared.state.lock().in_flight.contains_key(key)
    }
}

impl<P, S, E> Drop for Dispatcher<P, S, E>
where
    P: TaskPayload,
    S: JobStore<P> + 'static,
    E: JobExecutor<P>,
{
    fn drop(&mut self) {
        // Signal only; explicit shutdown() joins.
        let mut state = self.shared.state.lock();
        if !state.shutdown {
            state.shutdown = true;
            drop(state);
            self.shared.wake.notify_all();
            self.stop_tx.lock().take();
            debug!("dispatcher dropped without explicit shutdown");
        }
    }
}

fn run_timer<P, S, E>(shared: &Shared<P, S>, pool: &WorkerPool<P, E>)
where
    P: TaskPayload,
    S: JobStore<P>,
    E: JobExecutor<P>,
{
    debug!("timer thread started");
    loop {
        let fired = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    debug!("timer thread exiting");
                    return;
                }
                let now = shared.clock.now();
                match state.timers.peek().map(|entry| entry.fire_at) {
                    None => shared.wake.wait(&mut state),
                    Some(fire_at) if fire_at > now => {
                        let wait = (fire_at - now)
                            .to_std()
                            .unwrap_or(Duration::ZERO)
                            .min(shared.config.max_timer_sleep());
                        shared.wake.wait_for(&mut state, wait);
                    }
                    Some(_) => {
                        let Some(entry) = state.timers.pop() else {
                            continue;
                        };
                        if let Some(job) =
                            state.take_fireable(&entry, shared.config.max_attempts)
                        {
                            break job;
                        }
                    }
                }
            }
        };

        let key = fired.ctx.key.clone();
        let generation = fired.generation;
        info!(job = %key, attempt = fired.ctx.attempt, "job fired");
        match pool.submit(fired) {
            Ok(()) => {}
            Err(PoolError::QueueFull) => shared.release_rejected(&key, generation, true),
            Err(e) => {
                warn!(job = %key, error = %e, "worker pool rejected job");
                shared.release_rejected(&key, generation, false);
            }
        }
    }
}

fn run_completions<P, S>(shared: &Shared<P, S>, done_rx: &Receiver<Completion>, stop_rx: &Receiver<()>)
where
    P: TaskPayload,
    S: JobStore<P>,
{
    loop {
        select! {
            recv(done_rx) -> msg => match msg {
                Ok(completion) => shared.on_completion(completion),
                Err(_) => break,
            },
            recv(stop_rx) -> _ => break,
        }
    }
    debug!("completion thread exiting");
}
