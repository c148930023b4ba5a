//! Recording event handler for asserting on emitted dispatch events.

use std::sync::{Mutex, PoisonError};

use hookrelay_core::{DispatchEvent, EventHandler};

/// Event handler that keeps every event it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<DispatchEvent>>,
}

impl RecordingEventHandler {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all recorded events.
    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Attempt numbers of every `RetryScheduled` event for `operation`.
    pub fn retry_attempts(&self, operation: &str) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DispatchEvent::RetryScheduled(e) if e.operation == operation => Some(e.attempt),
                _ => None,
            })
            .collect()
    }

    /// Event ids of every `DuplicateSuppressed` event.
    pub fn suppressed_duplicates(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DispatchEvent::DuplicateSuppressed(e) => Some(e.event_id),
                _ => None,
            })
            .collect()
    }

    /// Task ids of every `TaskFailed` event, with their error codes.
    pub fn failed_tasks(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DispatchEvent::TaskFailed(e) => Some((e.task_id, e.error_code)),
                _ => None,
            })
            .collect()
    }

    /// Task ids of every `TaskSucceeded` event.
    pub fn succeeded_tasks(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DispatchEvent::TaskSucceeded(e) => Some(e.task_id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl EventHandler for RecordingEventHandler {
    async fn handle_event(&self, event: DispatchEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}
