//! Test infrastructure for deterministic dispatch pipeline testing.
//!
//! Provides an in-memory provider double with failure injection, a recording
//! event handler, gated tasks for concurrency assertions and event fixtures.
//! Everything runs against a virtual clock, so full retry schedules complete
//! without real sleeping.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use hookrelay_core::{EventHandler, MulticastEventHandler, RoutingTable};
use hookrelay_dispatch::{ClientConfig, DeliveryClient, DispatchTask, RetryPolicy};

pub mod events;
pub mod fixtures;
pub mod provider;
pub mod tasks;

pub use events::RecordingEventHandler;
pub use fixtures::{routes, sample_event, EventBuilder};
pub use hookrelay_core::{Clock, TestClock};
pub use provider::{Operation, ProviderCall, StubProviderApi};
pub use tasks::{Gate, GatedTask};

/// Wired-up delivery client backed by the in-memory provider.
///
/// All collaborators are exposed so tests can inject failures, inspect
/// provider calls and assert on emitted events.
#[derive(Debug, Clone)]
pub struct TestEnv {
    /// Virtual clock used for backoff sleeps.
    pub clock: TestClock,
    /// In-memory provider.
    pub provider: Arc<StubProviderApi>,
    /// Records every emitted dispatch event.
    pub events: Arc<RecordingEventHandler>,
    /// Client under test.
    pub client: Arc<DeliveryClient>,
}

impl TestEnv {
    /// Creates an environment with the default retry policy.
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    /// Creates an environment with a custom retry policy.
    pub fn with_policy(policy: RetryPolicy) -> Self {
        let clock = TestClock::new();
        let provider = Arc::new(StubProviderApi::new());
        let events = Arc::new(RecordingEventHandler::new());
        let client = Arc::new(DeliveryClient::new(
            provider.clone(),
            ClientConfig::default(),
            policy,
            Arc::new(clock.clone()),
            events.clone(),
        ));

        Self { clock, provider, events, client }
    }

    /// Event handler fanning out to the recorder and to `tracing`.
    pub fn event_handler(&self) -> Arc<dyn EventHandler> {
        let mut multicast = MulticastEventHandler::new();
        multicast.add_subscriber(self.events.clone());
        multicast.add_subscriber(Arc::new(hookrelay_core::TracingEventHandler::new()));
        Arc::new(multicast)
    }

    /// Builds a dispatch task for `event` using this environment's client.
    pub fn dispatch_task(
        &self,
        event: hookrelay_core::Event,
        routes: Arc<RoutingTable>,
    ) -> DispatchTask {
        DispatchTask::new(event, routes, self.client.clone())
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
