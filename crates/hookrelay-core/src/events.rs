//! Observability port for the dispatch pipeline.
//!
//! Pipeline components never log retry and outcome information through
//! process-wide state. Instead they receive an [`EventHandler`] at
//! construction and emit [`DispatchEvent`]s through it, which keeps retry and
//! outcome reporting deterministic under test.
//!
//! # Event Flow
//!
//! ```text
//! ┌─────────────────┐  RetryScheduled      ┌────────────────────┐
//! │ Retrier         │ ───────────────────▶ │                    │
//! ├─────────────────┤  DuplicateSuppressed │ MulticastHandler   │──▶ TracingEventHandler
//! │ DeliveryClient  │ ───────────────────▶ │ (Event Dispatcher) │──▶ test recorders
//! ├─────────────────┤  TaskSucceeded/Failed│                    │
//! │ WorkerPool      │ ───────────────────▶ │                    │
//! └─────────────────┘                      └────────────────────┘
//! ```

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Events emitted by the dispatch pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DispatchEvent {
    /// A transient failure will be retried after a backoff delay.
    RetryScheduled(RetryScheduledEvent),

    /// The provider reported the message as already processed.
    DuplicateSuppressed(DuplicateSuppressedEvent),

    /// A submitted task completed successfully.
    TaskSucceeded(TaskSucceededEvent),

    /// A submitted task completed with an error.
    TaskFailed(TaskFailedEvent),
}

/// Emitted before the retrier sleeps ahead of another attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryScheduledEvent {
    /// Name of the retried operation, e.g. `send_message`.
    pub operation: String,

    /// The attempt about to be made (1-based, so always at least 2).
    pub attempt: u32,

    /// Maximum attempts the policy allows.
    pub max_attempts: u32,

    /// Backoff delay before the next attempt.
    pub delay: Duration,

    /// Machine code of the failure that triggered the retry.
    pub error_code: String,

    /// Human readable failure description.
    pub error_message: String,

    /// When the retry was scheduled.
    pub scheduled_at: DateTime<Utc>,
}

/// Emitted when a delivery is normalized from a provider conflict to success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateSuppressedEvent {
    /// Upstream event id.
    pub event_id: String,

    /// Provider application the message was addressed to.
    pub application_id: String,

    /// When the duplicate was detected.
    pub detected_at: DateTime<Utc>,
}

/// Emitted when a worker finishes a task successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSucceededEvent {
    /// Task identity (the event id for dispatch tasks).
    pub task_id: String,

    /// Worker slot that executed the task.
    pub worker_id: usize,

    /// Wall time spent executing.
    pub duration: Duration,

    /// When the task completed.
    pub completed_at: DateTime<Utc>,
}

/// Emitted when a worker finishes a task with an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailedEvent {
    /// Task identity (the event id for dispatch tasks).
    pub task_id: String,

    /// Worker slot that executed the task.
    pub worker_id: usize,

    /// Machine code of the surfaced error.
    pub error_code: String,

    /// Human readable failure description.
    pub error_message: String,

    /// Whether the error kind is transient.
    pub is_retryable: bool,

    /// When the task failed.
    pub failed_at: DateTime<Utc>,
}

/// Trait for handling dispatch events.
///
/// Implementations must not block the pipeline. Failures inside a handler
/// are the handler's own concern and are never propagated back.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles a dispatch event.
    async fn handle_event(&self, event: DispatchEvent);
}

/// Event handler that discards all events.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Creates a new no-op event handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: DispatchEvent) {}
}

/// Event handler that writes every event to `tracing`.
#[derive(Debug, Default)]
pub struct TracingEventHandler;

impl TracingEventHandler {
    /// Creates a new tracing event handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for TracingEventHandler {
    async fn handle_event(&self, event: DispatchEvent) {
        match event {
            DispatchEvent::RetryScheduled(e) => {
                warn!(
                    operation = %e.operation,
                    attempt = e.attempt,
                    max_attempts = e.max_attempts,
                    delay_ms = u64::try_from(e.delay.as_millis()).unwrap_or(u64::MAX),
                    error_code = %e.error_code,
                    error = %e.error_message,
                    "retrying provider operation"
                );
            },
            DispatchEvent::DuplicateSuppressed(e) => {
                info!(
                    event_id = %e.event_id,
                    app_id = %e.application_id,
                    "provider already processed event, treating as delivered"
                );
            },
            DispatchEvent::TaskSucceeded(e) => {
                info!(
                    task_id = %e.task_id,
                    worker_id = e.worker_id,
                    duration_ms = u64::try_from(e.duration.as_millis()).unwrap_or(u64::MAX),
                    "task processed successfully"
                );
            },
            DispatchEvent::TaskFailed(e) => {
                warn!(
                    task_id = %e.task_id,
                    worker_id = e.worker_id,
                    error_code = %e.error_code,
                    error = %e.error_message,
                    retryable = e.is_retryable,
                    "task failed"
                );
            },
        }
    }
}

/// Event handler that forwards events to multiple subscribers.
///
/// Events are delivered to all subscribers concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a new multicast handler with no subscribers.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Adds a subscriber to receive dispatch events.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: DispatchEvent) {
        let futures = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move {
                handler.handle_event(event).await;
            }
        });

        futures::future::join_all(futures).await;
    }
}
