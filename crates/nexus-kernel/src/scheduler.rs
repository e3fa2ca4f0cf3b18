//! Bounded worker pool with a shared delay queue.
//!
//! The scheduler owns two background loops, spawned by [`Scheduler::start`]:
//!
//! - **Worker loop** -- drains a bounded run queue and executes each job on
//!   its own tokio task, never more than `max_concurrent` at a time (a
//!   [`Semaphore`] caps the pool).
//! - **Timer loop** -- a single binary-heap delay queue shared by every
//!   deferred job.  When a job's deadline passes it is moved onto the run
//!   queue.  No per-job sleeper is spawned while a job waits.
//!
//! # Backpressure
//!
//! Immediate submissions reserve a run-queue slot first
//! ([`Scheduler::reserve`]).  When the queue is at capacity the reservation
//! fails with [`KernelError::QueueFull`] so the caller can reject the work
//! *before* recording it anywhere.  Deferred jobs are never rejected at
//! release time; they wait for a free slot instead.
//!
//! ```text
//! submit ──reserve──> run queue ──permit──> worker task
//! schedule_at ──> delay queue ──deadline──┘
//! ```

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{KernelError, Result};
use crate::task::TaskId;

/// Stand-in deadline for a release time the monotonic clock cannot reach.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The async closure that the scheduler will execute.
///
/// We box the future so that callers can supply arbitrary async work without
/// leaking concrete types into the scheduler.
pub type TaskFn = Box<
    dyn FnOnce() -> Pin<Box<dyn Future<Output = std::result::Result<(), String>> + Send>> + Send,
>;

/// Pool and queue limits.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of jobs executing at once.
    ///
    /// Default: **8**.
    pub max_concurrent: usize,

    /// Maximum number of jobs waiting in the run queue.
    ///
    /// Default: **256**.
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            queue_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency cap (at least 1).
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    /// Set the run-queue capacity (at least 1).
    pub fn with_queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n.max(1);
        self
    }
}

/// A unit of work on the run queue.
struct Job {
    id: TaskId,
    name: String,
    work: TaskFn,
}

/// A job parked in the delay queue.
struct TimerEntry {
    due: Instant,
    /// Insertion order; breaks ties between equal deadlines.
    seq: u64,
    job: Job,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// A reserved place on the run queue.
///
/// Obtained from [`Scheduler::reserve`]; dropping it without calling
/// [`RunSlot::submit`] releases the slot.
pub struct RunSlot {
    permit: mpsc::OwnedPermit<Job>,
}

impl RunSlot {
    /// Hand `work` to the worker pool.  Cannot fail: the slot is already held.
    pub fn submit(self, id: TaskId, name: impl Into<String>, work: TaskFn) {
        let name = name.into();
        tracing::debug!(task_id = %id, task_name = %name, "job queued");
        self.permit.send(Job { id, name, work });
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Bounded worker pool plus shared delay queue.
///
/// The scheduler is cheaply cloneable (`Arc`-backed) and safe to share across
/// threads and async tasks.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    config: SchedulerConfig,

    run_tx: mpsc::Sender<Job>,
    run_rx: Mutex<Option<mpsc::Receiver<Job>>>,

    timer_tx: mpsc::UnboundedSender<TimerEntry>,
    timer_rx: Mutex<Option<mpsc::UnboundedReceiver<TimerEntry>>>,

    /// Caps concurrently executing jobs.
    permits: Arc<Semaphore>,

    /// Flips to `true` once on shutdown.
    stop_tx: watch::Sender<bool>,

    /// Monotonic counter for delay-queue tie breaking.
    seq: AtomicU64,

    /// Jobs currently parked in the delay queue.
    delayed: AtomicUsize,
}

impl Scheduler {
    /// Create a new scheduler **without** starting the background loops.
    ///
    /// Call [`Scheduler::start`] to spawn them onto the tokio runtime.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let (run_tx, run_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (stop_tx, _) = watch::channel(false);
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

        Self {
            inner: Arc::new(SchedulerInner {
                config,
                run_tx,
                run_rx: Mutex::new(Some(run_rx)),
                timer_tx,
                timer_rx: Mutex::new(Some(timer_rx)),
                permits,
                stop_tx,
                seq: AtomicU64::new(0),
                delayed: AtomicUsize::new(0),
            }),
        }
    }

    /// Spawn the worker and timer loops.
    ///
    /// Returns a [`JoinHandle`] that resolves when the scheduler is shut down.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        let run_rx = take_receiver(&self.inner.run_rx)?;
        let timer_rx = take_receiver(&self.inner.timer_rx)?;

        let worker_inner = Arc::clone(&self.inner);
        let timer_inner = Arc::clone(&self.inner);
        let worker_stop = self.inner.stop_tx.subscribe();
        let timer_stop = self.inner.stop_tx.subscribe();

        Ok(tokio::spawn(async move {
            tracing::info!(
                max_concurrent = worker_inner.config.max_concurrent,
                queue_capacity = worker_inner.config.queue_capacity,
                "scheduler started"
            );
            tokio::join!(
                Self::worker_loop(worker_inner, run_rx, worker_stop),
                Self::timer_loop(timer_inner, timer_rx, timer_stop),
            );
            tracing::info!("scheduler stopped");
        }))
    }

    /// Reserve a place on the run queue.
    ///
    /// Fails with [`KernelError::QueueFull`] when the queue is at capacity and
    /// with [`KernelError::SchedulerShutdown`] after [`Scheduler::shutdown`].
    pub fn reserve(&self) -> Result<RunSlot> {
        if self.is_shutdown() {
            return Err(KernelError::SchedulerShutdown);
        }
        match self.inner.run_tx.clone().try_reserve_owned() {
            Ok(permit) => Ok(RunSlot { permit }),
            Err(mpsc::error::TrySendError::Full(_)) => Err(KernelError::QueueFull {
                capacity: self.inner.config.queue_capacity,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(KernelError::SchedulerShutdown),
        }
    }

    /// Submit a job for execution as soon as a worker is free.
    pub fn submit(&self, id: TaskId, name: impl Into<String>, work: TaskFn) -> Result<()> {
        self.reserve()?.submit(id, name, work);
        Ok(())
    }

    /// Park a job in the delay queue until `when`.
    ///
    /// A `when` in the past releases the job on the next timer tick.
    pub fn schedule_at(
        &self,
        id: TaskId,
        name: impl Into<String>,
        when: DateTime<Utc>,
        work: TaskFn,
    ) -> Result<()> {
        if self.is_shutdown() {
            return Err(KernelError::SchedulerShutdown);
        }

        let delay = (when - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let now = Instant::now();
        let entry = TimerEntry {
            due: now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE),
            seq: self.inner.seq.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            job: Job {
                id,
                name: name.into(),
                work,
            },
        };

        self.inner
            .delayed
            .fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        if self.inner.timer_tx.send(entry).is_err() {
            self.inner
                .delayed
                .fetch_sub(1, std::sync::atomic::Ordering::AcqRel);
            return Err(KernelError::SchedulerShutdown);
        }

        tracing::debug!(task_id = %id, delay_ms = delay.as_millis() as u64, "job deferred");
        Ok(())
    }

    /// Number of jobs executing right now.
    pub fn running(&self) -> usize {
        self.inner
            .config
            .max_concurrent
            .saturating_sub(self.inner.permits.available_permits())
    }

    /// Number of jobs waiting in the delay queue.
    pub fn delayed(&self) -> usize {
        self.inner.delayed.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn is_shutdown(&self) -> bool {
        *self.inner.stop_tx.borrow()
    }

    /// Stop accepting new work and stop both loops.  Jobs that are already
    /// executing run to completion; queued and deferred jobs are dropped.
    pub fn shutdown(&self) {
        tracing::info!("scheduler shutdown requested");
        self.inner.stop_tx.send_replace(true);
    }

    // -- Private helpers ----------------------------------------------------

    async fn worker_loop(
        inner: Arc<SchedulerInner>,
        mut rx: mpsc::Receiver<Job>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            if *stop.borrow() {
                break;
            }

            let job = tokio::select! {
                _ = stop.changed() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            // Wait for a free worker before taking the next job.
            let permit = tokio::select! {
                _ = stop.changed() => break,
                permit = Arc::clone(&inner.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            tokio::spawn(async move {
                let _permit = permit;
                tracing::debug!(task_id = %job.id, task_name = %job.name, "job running");
                match (job.work)().await {
                    Ok(()) => tracing::debug!(task_id = %job.id, "job finished"),
                    Err(err) => tracing::error!(task_id = %job.id, error = %err, "job failed"),
                }
            });
        }
    }

    async fn timer_loop(
        inner: Arc<SchedulerInner>,
        mut rx: mpsc::UnboundedReceiver<TimerEntry>,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut heap: BinaryHeap<Reverse<TimerEntry>> = BinaryHeap::new();

        loop {
            if *stop.borrow() {
                break;
            }

            let next_due = heap.peek().map(|Reverse(entry)| entry.due);
            tokio::select! {
                _ = stop.changed() => break,
                entry = rx.recv() => match entry {
                    Some(entry) => heap.push(Reverse(entry)),
                    None => break,
                },
                _ = sleep_until(next_due) => {
                    let now = Instant::now();
                    while heap.peek().is_some_and(|Reverse(entry)| entry.due <= now) {
                        if let Some(Reverse(entry)) = heap.pop() {
                            inner.delayed.fetch_sub(1, std::sync::atomic::Ordering::AcqRel);
                            Self::release(&inner, entry.job);
                        }
                    }
                }
            }
        }
    }

    /// Move a due job onto the run queue.  When the queue is full the job
    /// waits for a slot on a short-lived task so the timer keeps ticking.
    fn release(inner: &SchedulerInner, job: Job) {
        tracing::debug!(task_id = %job.id, "deferred job due");
        match inner.run_tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                let tx = inner.run_tx.clone();
                tokio::spawn(async move {
                    let id = job.id;
                    if tx.send(job).await.is_err() {
                        tracing::warn!(task_id = %id, "run queue closed; deferred job dropped");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(task_id = %job.id, "run queue closed; deferred job dropped");
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

fn take_receiver<T>(slot: &Mutex<Option<T>>) -> Result<T> {
    slot.lock()
        .map_err(|e| KernelError::Internal(format!("mutex poisoned: {e}")))?
        .take()
        .ok_or(KernelError::AlreadyStarted)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
