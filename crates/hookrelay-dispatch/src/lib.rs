//! Event dispatch pipeline for the webhook relay.
//!
//! Takes upstream domain events and relays each one, exactly once from the
//! submitter's point of view, to the delivery provider application that owns
//! the event's project.
//!
//! # Architecture
//!
//! ```text
//! submit(DispatchTask) ──▶ WorkerPool ──▶ DispatchTask ──▶ DeliveryClient ──▶ ProviderApi
//!        ▲                  (N workers)    (routing)       (Retrier)           (HTTP)
//!        └──────────── one-shot outcome ◀─────────────────────────────────────────┘
//! ```
//!
//! 1. **Classify** - every provider failure becomes a [`RelayError`] kind
//! 2. **Retry** - transient kinds are retried with exponential backoff
//! 3. **Deduplicate** - a provider conflict on delivery counts as success
//! 4. **Bound** - at most `max_workers` tasks execute at once
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hookrelay_core::{time::real_clock, Event, RoutingTable, TracingEventHandler};
//! use hookrelay_dispatch::{
//!     ClientConfig, DeliveryClient, DispatchTask, HttpProviderApi, PoolConfig, ProviderConfig,
//!     RelayError, RetryPolicy, WorkerPool,
//! };
//!
//! # async fn example(event: Event, routes: Arc<RoutingTable>) -> Result<(), RelayError> {
//! let events = Arc::new(TracingEventHandler::new());
//! let api = HttpProviderApi::new(ProviderConfig {
//!     token: "sk_test".to_string(),
//!     ..Default::default()
//! })?;
//! let client = Arc::new(DeliveryClient::new(
//!     Arc::new(api),
//!     ClientConfig::default(),
//!     RetryPolicy::default(),
//!     real_clock(),
//!     events.clone(),
//! ));
//!
//! let pool = WorkerPool::new(PoolConfig::default(), events)?;
//! pool.submit(DispatchTask::new(event, routes, client)).await?;
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod provider;
pub mod provisioning;
pub mod retry;
pub mod task;
pub mod worker_pool;

pub use client::{ClientConfig, DeliveryClient};
pub use error::{classify, ErrorKind, RelayError, Result};
pub use provider::{HttpProviderApi, ProviderApi, ProviderConfig, ProviderMessage};
pub use provisioning::{initialize_applications, ProvisioningConfig};
pub use retry::{Retrier, RetryPolicy};
pub use task::{DispatchTask, Task, TaskContext};
pub use worker_pool::{PoolConfig, PoolState, ShutdownError, WorkerPool};

/// Default number of concurrent workers.
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Default number of jobs buffered ahead of the workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default attempts per provider operation, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default provider request timeout in seconds.
pub const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 30;
