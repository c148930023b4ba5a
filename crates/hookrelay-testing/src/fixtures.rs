//! Event and routing fixtures.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use hookrelay_core::{Event, EventData, EventType, RoutingTable};
use serde_json::{json, Value};

static NEXT_EVENT: AtomicU64 = AtomicU64::new(1);

/// The canonical event used across pipeline tests:
/// `evt_1` / `user.created` / project `dev`.
pub fn sample_event() -> Event {
    EventBuilder::new()
        .id("evt_1")
        .event_type(EventType::UserCreated)
        .project("dev")
        .data(json!({"user": {"id": "usr_1", "email": "jane@example.com"}}))
        .build()
}

/// Shared routing table built from `(project, app_id)` pairs.
pub fn routes(pairs: &[(&str, &str)]) -> Arc<RoutingTable> {
    Arc::new(pairs.iter().copied().collect())
}

/// Builder for test events with unique ids by default.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    id: String,
    event_type: EventType,
    project: String,
    data: EventData,
}

impl EventBuilder {
    /// Creates a builder for a `user.created` event in project `dev`.
    pub fn new() -> Self {
        Self {
            id: format!("evt_{:06}", NEXT_EVENT.fetch_add(1, Ordering::Relaxed)),
            event_type: EventType::UserCreated,
            project: "dev".to_string(),
            data: EventData::new(),
        }
    }

    /// Sets the event id.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the event type.
    #[must_use]
    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    /// Sets the project.
    #[must_use]
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Sets the payload. Non-object values are stored under `value`.
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = match data {
            Value::Object(map) => map,
            other => {
                let mut map = EventData::new();
                map.insert("value".to_string(), other);
                map
            },
        };
        self
    }

    /// Builds the event.
    pub fn build(self) -> Event {
        Event::new(self.id, self.event_type, self.project, self.data)
    }
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self::new()
    }
}
