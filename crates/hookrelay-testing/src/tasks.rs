//! Controllable tasks for worker pool concurrency tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use hookrelay_dispatch::{RelayError, Result, Task, TaskContext};
use tokio::sync::{Notify, Semaphore};

/// Shared barrier that [`GatedTask`]s block on until released.
///
/// Tracks how many gated tasks are executing right now and the highest
/// concurrency observed.
#[derive(Debug)]
pub struct Gate {
    permits: Semaphore,
    started: AtomicUsize,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
    notify: Notify,
}

impl Gate {
    /// Creates a closed gate.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            permits: Semaphore::new(0),
            started: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            notify: Notify::new(),
        })
    }

    /// Lets `count` waiting (or future) tasks finish.
    pub fn release(&self, count: usize) {
        self.permits.add_permits(count);
    }

    /// Number of tasks that have started executing.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Highest number of tasks observed executing at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` tasks have started.
    pub async fn wait_for_started(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.started() >= count {
                return;
            }
            notified.await;
        }
    }

    fn enter(&self) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(current, Ordering::SeqCst);
        self.started.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Task that blocks on a [`Gate`] and then returns a fixed outcome.
///
/// Gives up with `Internal` (`cancelled`) when the pool cancels it, unless
/// built with [`GatedTask::ignoring_cancellation`].
#[derive(Debug)]
pub struct GatedTask {
    id: String,
    gate: Arc<Gate>,
    outcome: Result<()>,
    honors_cancellation: bool,
}

impl GatedTask {
    /// Creates a task that succeeds once released.
    pub fn new(id: impl Into<String>, gate: Arc<Gate>) -> Self {
        Self { id: id.into(), gate, outcome: Ok(()), honors_cancellation: true }
    }

    /// Creates a task that waits for the gate even after cancellation.
    pub fn ignoring_cancellation(id: impl Into<String>, gate: Arc<Gate>) -> Self {
        Self { id: id.into(), gate, outcome: Ok(()), honors_cancellation: false }
    }

    /// Creates a task that fails with `error` once released.
    pub fn failing(id: impl Into<String>, gate: Arc<Gate>, error: RelayError) -> Self {
        Self { id: id.into(), gate, outcome: Err(error), honors_cancellation: true }
    }
}

#[async_trait::async_trait]
impl Task for GatedTask {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<()> {
        self.gate.enter();

        let cancelled = async {
            if self.honors_cancellation {
                ctx.cancellation().cancelled().await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        let released = tokio::select! {
            permit = self.gate.permits.acquire() => {
                if let Ok(permit) = permit {
                    permit.forget();
                }
                true
            },
            () = cancelled => false,
        };

        self.gate.exit();

        if released {
            self.outcome.clone()
        } else {
            Err(RelayError::internal("cancelled", format!("task {} cancelled", self.id)))
        }
    }
}
