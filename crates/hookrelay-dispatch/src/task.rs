//! Units of work executed by the worker pool.

use std::sync::Arc;

use hookrelay_core::{Event, RoutingTable};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    client::DeliveryClient,
    error::{RelayError, Result},
};

/// Execution context handed to a task by the worker running it.
#[derive(Debug, Clone)]
pub struct TaskContext {
    worker_id: usize,
    cancellation: CancellationToken,
}

impl TaskContext {
    /// Creates a context for `worker_id`.
    pub fn new(worker_id: usize, cancellation: CancellationToken) -> Self {
        Self { worker_id, cancellation }
    }

    /// Context for running a task outside any pool.
    pub fn detached() -> Self {
        Self::new(0, CancellationToken::new())
    }

    /// Worker slot running the task.
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Fires when the pool gives up waiting for in-flight work.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// A unit of work the pool can execute.
#[async_trait::async_trait]
pub trait Task: Send + Sync {
    /// Identity used in logs and outcome events.
    fn id(&self) -> &str;

    /// Runs the task to completion.
    async fn execute(&self, ctx: &TaskContext) -> Result<()>;
}

/// Relays one event to the provider application of its project.
///
/// Performs no retries of its own; transient provider failures are
/// already retried inside [`DeliveryClient::deliver`].
#[derive(Debug, Clone)]
pub struct DispatchTask {
    event: Event,
    routes: Arc<RoutingTable>,
    client: Arc<DeliveryClient>,
}

impl DispatchTask {
    /// Creates a dispatch task.
    pub fn new(event: Event, routes: Arc<RoutingTable>, client: Arc<DeliveryClient>) -> Self {
        Self { event, routes, client }
    }
}

#[async_trait::async_trait]
impl Task for DispatchTask {
    fn id(&self) -> &str {
        &self.event.id
    }

    #[instrument(
        name = "dispatch_task",
        skip(self, ctx),
        fields(event_id = %self.event.id, project = %self.event.project, worker_id = ctx.worker_id())
    )]
    async fn execute(&self, ctx: &TaskContext) -> Result<()> {
        let Some(project) = self.event.routing_key() else {
            return Err(RelayError::validation("missing_project", "event has no project"));
        };

        let Some(app_id) = self.routes.resolve(project) else {
            return Err(RelayError::not_found(
                "unknown_project",
                format!("no provider application for project {project}"),
            ));
        };

        debug!(app_id, "routing event to provider application");
        self.client.deliver(app_id, &self.event, ctx.cancellation()).await
    }
}
