//! Core domain models and shared abstractions.
//!
//! Provides the event and routing types relayed by the dispatch pipeline,
//! the observability port every pipeline component reports through, and the
//! clock abstraction used for backoff timing. All other crates depend on
//! these foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{
    DispatchEvent, DuplicateSuppressedEvent, EventHandler, MulticastEventHandler,
    NoOpEventHandler, RetryScheduledEvent, TaskFailedEvent, TaskSucceededEvent,
    TracingEventHandler,
};
pub use models::{Event, EventData, EventType, RoutingTable};
pub use time::{Clock, RealClock, TestClock};
