//! Bounded worker pool with rendezvous submission and graceful drain.
//!
//! A fixed set of worker tasks pulls jobs from a shared queue. Each job
//! carries a one-shot reply channel, so [`WorkerPool::submit`] resolves with
//! exactly the outcome of the submitted task. A worker takes its next job
//! only after the previous task has fully completed, which bounds concurrent
//! executions by the worker count.
//!
//! # Lifecycle
//!
//! ```text
//! Running ──close()──▶ Draining ──all workers joined──▶ Stopped
//! ```

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use hookrelay_core::{
    time::real_clock, Clock, DispatchEvent, EventHandler, TaskFailedEvent, TaskSucceededEvent,
};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, oneshot, watch, Mutex},
    task::{AbortHandle, JoinHandle},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{RelayError, Result},
    task::{Task, TaskContext},
};

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of workers, i.e. maximum concurrent task executions.
    pub max_workers: usize,

    /// Jobs buffered ahead of the workers before `submit` starts waiting.
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: crate::DEFAULT_MAX_WORKERS,
            queue_capacity: crate::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Lifecycle state of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    /// Accepting submissions.
    Running,
    /// Rejecting submissions, finishing queued and in-flight tasks.
    Draining,
    /// All workers have exited.
    Stopped,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Errors raised while shutting the pool down.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ShutdownError {
    /// In-flight tasks did not finish before the deadline and were cancelled.
    #[error("worker pool did not drain within {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },
}

/// How long workers get to wind down after cancellation before they are
/// aborted.
const ABORT_GRACE_PERIOD: Duration = Duration::from_secs(1);

struct Job {
    task: Box<dyn Task>,
    reply: oneshot::Sender<Result<()>>,
}

/// Fixed-size pool of workers executing [`Task`]s.
pub struct WorkerPool {
    config: PoolConfig,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    state: watch::Sender<PoolState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
}

impl WorkerPool {
    /// Creates a pool and spawns its workers on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error when `max_workers` is zero.
    pub fn new(config: PoolConfig, events: Arc<dyn EventHandler>) -> Result<Self> {
        Self::with_clock(config, events, real_clock())
    }

    /// Creates a pool that measures task durations with `clock`.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error when `max_workers` is zero.
    pub fn with_clock(
        config: PoolConfig,
        events: Arc<dyn EventHandler>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.max_workers == 0 {
            return Err(RelayError::validation(
                "invalid_pool_size",
                "max_workers must be greater than zero",
            ));
        }

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let cancellation_token = CancellationToken::new();

        let workers = (0..config.max_workers)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    receiver: receiver.clone(),
                    in_flight: in_flight.clone(),
                    cancellation_token: cancellation_token.clone(),
                    events: events.clone(),
                    clock: clock.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(max_workers = config.max_workers, "worker pool started");

        let (state, _) = watch::channel(PoolState::Running);

        Ok(Self {
            config,
            sender: Mutex::new(Some(sender)),
            state,
            workers: Mutex::new(workers),
            in_flight,
            cancellation_token,
        })
    }

    /// Submits `task` and waits for its outcome.
    ///
    /// Waits for a free queue slot when all workers are busy and the queue
    /// is full.
    ///
    /// # Errors
    ///
    /// Returns the task's own error, `Internal` (`pool_closed`) when the pool
    /// is no longer running, or `Internal` (`task_panicked`) when the task
    /// panicked.
    pub async fn submit<T: Task + 'static>(&self, task: T) -> Result<()> {
        let task_id = task.id().to_string();

        let sender = self.sender.lock().await.clone();
        let Some(sender) = sender else {
            debug!(task_id = %task_id, "rejecting submission, pool is not running");
            return Err(pool_closed());
        };

        let (reply, outcome) = oneshot::channel();
        if sender.send(Job { task: Box::new(task), reply }).await.is_err() {
            return Err(pool_closed());
        }
        drop(sender);

        debug!(task_id = %task_id, "task queued");

        outcome.await.unwrap_or_else(|_| {
            Err(RelayError::internal(
                "worker_lost",
                format!("worker exited before reporting the outcome of task {task_id}"),
            ))
        })
    }

    /// Stops accepting work and waits for queued and in-flight tasks.
    ///
    /// Safe to call more than once; later calls wait for the first to finish.
    pub async fn close(&self) {
        let _ = self.drain(None).await;
    }

    /// Like [`WorkerPool::close`], but cancels in-flight tasks once `timeout`
    /// elapses. Workers still busy after a further grace period are aborted,
    /// and their submitters see `Internal` (`worker_lost`).
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Timeout`] when the deadline was exceeded. The
    /// pool is stopped either way.
    pub async fn close_with_timeout(&self, timeout: Duration) -> std::result::Result<(), ShutdownError> {
        self.drain(Some(timeout)).await
    }

    async fn drain(&self, timeout: Option<Duration>) -> std::result::Result<(), ShutdownError> {
        if self.sender.lock().await.take().is_some() {
            self.state.send_replace(PoolState::Draining);
            info!(in_flight = self.in_flight(), "worker pool draining");
        }

        // Held until every worker is joined. Handles stay in the vector
        // until they finish, so a close that is dropped midway leaves the
        // rest for the next caller.
        let mut workers = self.workers.lock().await;

        let result = match timeout {
            None => {
                join_workers(&mut workers).await;
                Ok(())
            },
            Some(timeout) => {
                if tokio::time::timeout(timeout, join_workers(&mut workers)).await.is_ok() {
                    Ok(())
                } else {
                    error!(
                        timeout_seconds = timeout.as_secs(),
                        in_flight = self.in_flight(),
                        "worker pool drain timed out, cancelling in-flight tasks"
                    );
                    self.cancellation_token.cancel();

                    let grace = join_workers(&mut workers);
                    if tokio::time::timeout(ABORT_GRACE_PERIOD, grace).await.is_err() {
                        warn!(
                            workers = workers.len(),
                            "tasks ignored cancellation, aborting workers"
                        );
                        for handle in workers.iter() {
                            handle.abort();
                        }
                        join_workers(&mut workers).await;
                    }
                    Err(ShutdownError::Timeout { timeout })
                }
            },
        };

        if self.state.send_replace(PoolState::Stopped) != PoolState::Stopped {
            info!("worker pool stopped");
        }
        result
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    /// Number of workers.
    pub fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    /// Number of tasks currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.sender.get_mut().is_some() {
            error!("WorkerPool dropped without close(), cancelling in-flight tasks");
            self.cancellation_token.cancel();
        }
    }
}

/// Joins workers from the back, popping each handle once it has finished.
async fn join_workers(handles: &mut Vec<JoinHandle<()>>) {
    while let Some(handle) = handles.last_mut() {
        let joined = handle.await;
        handles.pop();
        let worker_id = handles.len();

        match joined {
            Ok(()) => {},
            Err(join_error) if join_error.is_cancelled() => debug!(worker_id, "worker aborted"),
            Err(join_error) => {
                error!(worker_id, error = %join_error, "worker task terminated abnormally");
            },
        }
    }
}

/// Counts a task as in flight while alive. Dropping it (including when the
/// worker itself is aborted) aborts the task and releases the count.
struct InFlight {
    counter: Arc<AtomicUsize>,
    task: AbortHandle,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.task.abort();
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

fn pool_closed() -> RelayError {
    RelayError::internal("pool_closed", "worker pool is not accepting tasks")
}

struct Worker {
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    in_flight: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
    events: Arc<dyn EventHandler>,
    clock: Arc<dyn Clock>,
}

impl Worker {
    async fn run(self) {
        debug!(worker_id = self.id, "worker started");

        loop {
            let job = self.receiver.lock().await.recv().await;
            let Some(job) = job else {
                break;
            };
            self.process(job).await;
        }

        debug!(worker_id = self.id, "worker stopped");
    }

    async fn process(&self, job: Job) {
        let Job { task, reply } = job;
        let task_id = task.id().to_string();
        let ctx = TaskContext::new(self.id, self.cancellation_token.child_token());

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let started = self.clock.now();

        let handle = tokio::spawn(async move { task.execute(&ctx).await });
        let in_flight = InFlight { counter: self.in_flight.clone(), task: handle.abort_handle() };
        let joined = handle.await;
        drop(in_flight);

        let duration = self.clock.now().saturating_duration_since(started);

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(
                    worker_id = self.id,
                    task_id = %task_id,
                    error = %join_error,
                    "task panicked"
                );
                Err(RelayError::internal("task_panicked", format!("task {task_id} panicked")))
            },
        };

        let event = match &outcome {
            Ok(()) => DispatchEvent::TaskSucceeded(TaskSucceededEvent {
                task_id: task_id.clone(),
                worker_id: self.id,
                duration,
                completed_at: self.clock.now_utc(),
            }),
            Err(error) => DispatchEvent::TaskFailed(TaskFailedEvent {
                task_id: task_id.clone(),
                worker_id: self.id,
                error_code: error.code().to_string(),
                error_message: error.to_string(),
                is_retryable: error.is_retryable(),
                failed_at: self.clock.now_utc(),
            }),
        };
        self.events.handle_event(event).await;

        if reply.send(outcome).is_err() {
            warn!(
                worker_id = self.id,
                task_id = %task_id,
                "submitter gone before task outcome was delivered"
            );
        }
    }
}
