//! Event ingress: validation and submission to the worker pool.
//!
//! Two entry points accept the same event document. `POST /notifications`
//! takes it as the raw JSON body; `POST /pubsub/push` takes a Pub/Sub push
//! envelope carrying it base64 encoded. Both validate every field up front,
//! then submit a [`DispatchTask`] and wait for its outcome.

use std::collections::HashMap;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hookrelay_core::{Event, EventData, EventType};
use hookrelay_dispatch::{DispatchTask, RelayError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{error_response, validation_response, FieldError};
use crate::AppState;

/// Largest accepted event document.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Largest accepted push envelope: a base64-encoded maximal document plus
/// room for the envelope fields.
pub const MAX_ENVELOPE_SIZE: usize = MAX_PAYLOAD_SIZE.div_ceil(3) * 4 + 64 * 1024;

const EVENT_ID_PREFIX: &str = "evt_";

/// Response for an event that was relayed.
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    /// Upstream event id
    pub event_id: String,
    /// Always `accepted`
    pub status: String,
}

/// Google Pub/Sub push request body.
#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    /// The pushed message.
    pub message: PushMessage,
    /// Subscription that delivered the message.
    #[serde(default)]
    pub subscription: Option<String>,
}

/// Message inside a [`PushEnvelope`].
#[derive(Debug, Deserialize)]
pub struct PushMessage {
    /// Base64 encoded event document.
    pub data: String,
    /// Pub/Sub message id.
    #[serde(default, rename = "messageId")]
    pub message_id: Option<String>,
    /// Message attributes.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Loosely typed event document, so that every invalid field can be
/// reported instead of only the first one serde trips over.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "type")]
    event_type: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

/// Receives an event document posted directly as JSON.
#[instrument(name = "receive_notification", skip(state, body), fields(content_length = body.len()))]
pub async fn receive_notification(State(state): State<AppState>, body: Bytes) -> Response {
    if let Some(response) = reject_oversized(body.len(), MAX_PAYLOAD_SIZE) {
        return response;
    }

    match parse_event(&body, state.clock.now_utc()) {
        Ok(event) => dispatch(&state, event).await,
        Err(errors) => {
            warn!(error_count = errors.len(), "rejecting invalid event");
            validation_response(errors)
        },
    }
}

/// Receives an event document wrapped in a Pub/Sub push envelope.
#[instrument(name = "receive_pubsub_push", skip(state, body), fields(content_length = body.len()))]
pub async fn receive_pubsub_push(State(state): State<AppState>, body: Bytes) -> Response {
    if let Some(response) = reject_oversized(body.len(), MAX_ENVELOPE_SIZE) {
        return response;
    }

    let envelope: PushEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "rejecting malformed push envelope");
            return validation_response(vec![FieldError::new(
                "body",
                format!("invalid push envelope: {e}"),
            )]);
        },
    };

    debug!(
        message_id = envelope.message.message_id.as_deref().unwrap_or("none"),
        subscription = envelope.subscription.as_deref().unwrap_or("none"),
        attributes = envelope.message.attributes.len(),
        "push envelope received"
    );

    let document = match STANDARD.decode(envelope.message.data.trim()) {
        Ok(document) => document,
        Err(e) => {
            warn!(error = %e, "rejecting push envelope with undecodable data");
            return validation_response(vec![FieldError::new(
                "body",
                format!("message.data is not valid base64: {e}"),
            )]);
        },
    };

    if let Some(response) = reject_oversized(document.len(), MAX_PAYLOAD_SIZE) {
        return response;
    }

    match parse_event(&document, state.clock.now_utc()) {
        Ok(event) => dispatch(&state, event).await,
        Err(errors) => {
            warn!(error_count = errors.len(), "rejecting invalid pushed event");
            validation_response(errors)
        },
    }
}

fn reject_oversized(size: usize, limit: usize) -> Option<Response> {
    if size <= limit {
        return None;
    }

    warn!(payload_size = size, limit, "Payload exceeds size limit");
    Some(error_response(&RelayError::payload_too_large(format!(
        "payload of {size} bytes exceeds the {limit} byte limit"
    ))))
}

/// Submits the event and maps the task outcome to a response.
async fn dispatch(state: &AppState, event: Event) -> Response {
    let event_id = event.id.clone();
    let task = DispatchTask::new(event, state.routes.clone(), state.client.clone());

    match state.pool.submit(task).await {
        Ok(()) => {
            info!(event_id = %event_id, "event relayed");
            (
                StatusCode::ACCEPTED,
                Json(AcceptedResponse { event_id, status: "accepted".to_string() }),
            )
                .into_response()
        },
        Err(error) => {
            warn!(event_id = %event_id, error = %error, kind = %error.kind(), "event relay failed");
            error_response(&error)
        },
    }
}

/// Parses and validates an event document.
///
/// Collects one [`FieldError`] per invalid field.
pub fn parse_event(document: &[u8], now: DateTime<Utc>) -> Result<Event, Vec<FieldError>> {
    let raw: RawEvent = serde_json::from_slice(document)
        .map_err(|e| vec![FieldError::new("body", format!("invalid JSON event: {e}"))])?;

    let mut errors = Vec::new();

    let id = match raw.id.map(|id| id.trim().to_string()) {
        Some(id) if id.len() > EVENT_ID_PREFIX.len() && id.starts_with(EVENT_ID_PREFIX) => Some(id),
        Some(_) => {
            errors.push(FieldError::new("id", format!("must start with {EVENT_ID_PREFIX}")));
            None
        },
        None => {
            errors.push(FieldError::new("id", "is required"));
            None
        },
    };

    let event_type = match raw.event_type {
        Some(name) => match name.parse::<EventType>() {
            Ok(event_type) => Some(event_type),
            Err(_) => {
                errors.push(FieldError::new("type", format!("unsupported event type {name}")));
                None
            },
        },
        None => {
            errors.push(FieldError::new("type", "is required"));
            None
        },
    };

    let project = raw.project.map(|project| project.trim().to_string()).unwrap_or_default();
    if project.is_empty() {
        errors.push(FieldError::new("project", "is required"));
    }

    let created_at = match raw.created_at {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value::<DateTime<Utc>>(value) {
            Ok(created_at) if created_at > now => {
                errors.push(FieldError::new("created_at", "must not be in the future"));
                None
            },
            Ok(created_at) => Some(created_at),
            Err(_) => {
                errors.push(FieldError::new("created_at", "must be an RFC 3339 timestamp"));
                None
            },
        },
    };

    let data = match raw.data {
        None | Some(Value::Null) => EventData::new(),
        Some(Value::Object(data)) => data,
        Some(_) => {
            errors.push(FieldError::new("data", "must be a JSON object"));
            EventData::new()
        },
    };

    match (id, event_type) {
        (Some(id), Some(event_type)) if errors.is_empty() => {
            let mut event = Event::new(id, event_type, project, data);
            event.created_at = created_at;
            Ok(event)
        },
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-15T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|error| error.field.as_str()).collect()
    }

    #[test]
    fn valid_document_parses() {
        let document = json!({
            "id": "evt_1",
            "type": "user.created",
            "project": "dev",
            "created_at": "2026-01-15T11:59:00Z",
            "data": {"user": {"id": "usr_1"}}
        });

        let event = parse_event(document.to_string().as_bytes(), now()).unwrap();

        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, EventType::UserCreated);
        assert_eq!(event.project, "dev");
        assert_eq!(event.data["user"]["id"], "usr_1");
        assert!(event.created_at.is_some());
    }

    #[test]
    fn every_invalid_field_is_reported() {
        let document = json!({
            "id": "1234",
            "type": "user.deleted",
            "project": "  ",
            "created_at": (now() + Duration::hours(1)).to_rfc3339(),
            "data": [1, 2, 3]
        });

        let errors = parse_event(document.to_string().as_bytes(), now()).unwrap_err();

        assert_eq!(fields(&errors), vec!["id", "type", "project", "created_at", "data"]);
    }

    #[test]
    fn missing_fields_are_required() {
        let errors = parse_event(b"{}", now()).unwrap_err();
        assert_eq!(fields(&errors), vec!["id", "type", "project"]);
    }

    #[test]
    fn bare_prefix_is_not_an_id() {
        let document = json!({"id": "evt_", "type": "user.created", "project": "dev"});
        let errors = parse_event(document.to_string().as_bytes(), now()).unwrap_err();
        assert_eq!(fields(&errors), vec!["id"]);
    }

    #[test]
    fn malformed_json_is_a_body_error() {
        let errors = parse_event(b"{not json", now()).unwrap_err();
        assert_eq!(fields(&errors), vec!["body"]);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        assert!(reject_oversized(MAX_PAYLOAD_SIZE, MAX_PAYLOAD_SIZE).is_none());
        let response = reject_oversized(MAX_PAYLOAD_SIZE + 1, MAX_PAYLOAD_SIZE).unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn envelope_limit_fits_an_encoded_maximal_document() {
        let encoded = STANDARD.encode(vec![b'x'; MAX_PAYLOAD_SIZE]);
        assert!(encoded.len() < MAX_ENVELOPE_SIZE);
    }
}
