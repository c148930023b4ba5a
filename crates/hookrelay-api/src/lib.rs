//! hookrelay HTTP ingress and service configuration.
//!
//! Receives upstream events over HTTP, validates them, submits one dispatch
//! task per event to the worker pool and answers with the task's outcome.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use hookrelay_core::{Clock, RoutingTable};
use hookrelay_dispatch::{DeliveryClient, WorkerPool};

pub mod config;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{create_router, start_server};

/// Shared state handed to every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Pool executing dispatch tasks.
    pub pool: Arc<WorkerPool>,
    /// Client used by dispatch tasks.
    pub client: Arc<DeliveryClient>,
    /// Project to application routing, fixed at startup.
    pub routes: Arc<RoutingTable>,
    /// Clock for timestamps and `created_at` validation.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Creates the application state.
    pub fn new(
        pool: Arc<WorkerPool>,
        client: Arc<DeliveryClient>,
        routes: Arc<RoutingTable>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { pool, client, routes, clock }
    }
}
