//! REST adapter for the webhook delivery provider.
//!
//! [`ProviderApi`] is the pipeline's only I/O seam: one method per provider
//! call, each returning an already classified [`RelayError`] on failure.
//! [`HttpProviderApi`] implements it against a Svix-compatible v1 API.

use std::{fmt, time::Duration};

use hookrelay_core::{Event, EventData};
use reqwest::{RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info_span, Instrument};

use crate::error::{classify, RelayError, Result};

/// Page size requested from list endpoints.
const LIST_PAGE_LIMIT: &str = "250";

/// Upper bound on error body bytes kept for classification detail.
const MAX_ERROR_DETAIL_BYTES: usize = 1024;

/// Application creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationIn {
    /// Unique application name.
    pub name: String,
    /// Per-application delivery rate limit, messages per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u16>,
}

/// Application as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplicationOut {
    /// Provider-assigned application id.
    pub id: String,
    /// Application name.
    pub name: String,
}

/// Event type registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTypeIn {
    /// Event type name, e.g. `user.created`.
    pub name: String,
    /// Human readable description.
    pub description: String,
}

/// Endpoint registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointIn {
    /// Destination URL.
    pub url: String,
    /// Human readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Event types this endpoint receives.
    pub filter_types: Vec<String>,
    /// Endpoint payload version.
    pub version: u32,
}

/// Endpoint as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointOut {
    /// Provider-assigned endpoint id.
    pub id: String,
    /// Destination URL.
    pub url: String,
}

/// Message sent to the provider for fan-out.
///
/// The upstream event id doubles as the provider's idempotency key: a second
/// message with the same `eventId` is rejected with a conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMessage {
    /// Upstream event id.
    pub event_id: String,
    /// Event type name.
    pub event_type: String,
    /// Event payload.
    pub payload: EventData,
}

impl ProviderMessage {
    /// Builds the provider message for an event.
    pub fn from_event(event: &Event) -> Self {
        Self {
            event_id: event.id.clone(),
            event_type: event.event_type.as_str().to_string(),
            payload: event.data.clone(),
        }
    }
}

/// Operations the relay needs from the delivery provider.
///
/// Implementations classify every failure through [`classify`] before
/// returning it; callers never see raw status codes.
#[async_trait::async_trait]
pub trait ProviderApi: Send + Sync + fmt::Debug {
    /// Lists every application, following pagination.
    async fn list_applications(&self) -> Result<Vec<ApplicationOut>>;

    /// Creates an application.
    async fn create_application(&self, request: &ApplicationIn) -> Result<ApplicationOut>;

    /// Registers an event type.
    async fn create_event_type(&self, request: &EventTypeIn) -> Result<()>;

    /// Lists every endpoint of an application, following pagination.
    async fn list_endpoints(&self, app_id: &str) -> Result<Vec<EndpointOut>>;

    /// Registers an endpoint on an application.
    async fn create_endpoint(&self, app_id: &str, request: &EndpointIn) -> Result<EndpointOut>;

    /// Sends a message to an application.
    async fn create_message(&self, app_id: &str, message: &ProviderMessage) -> Result<()>;
}

/// Connection settings for [`HttpProviderApi`].
#[derive(Clone)]
pub struct ProviderConfig {
    /// API base URL, e.g. `https://api.svix.com`.
    pub base_url: String,
    /// Bearer token.
    pub token: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.svix.com".to_string(),
            token: String::new(),
            timeout: Duration::from_secs(crate::DEFAULT_PROVIDER_TIMEOUT_SECONDS),
            user_agent: format!("hookrelay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("token", &"***")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
    #[serde(default)]
    iterator: Option<String>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// HTTP implementation of [`ProviderApi`].
#[derive(Debug, Clone)]
pub struct HttpProviderApi {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpProviderApi {
    /// Creates a provider client.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error when the token is empty or the HTTP
    /// client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(RelayError::validation(
                "invalid_configuration",
                "provider token must not be empty",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                RelayError::validation(
                    "invalid_configuration",
                    format!("failed to build HTTP client: {e}"),
                )
            })?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Sends a request and returns the response if it succeeded.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response =
            request.bearer_auth(&self.config.token).send().await.map_err(transport_error)?;

        let status = response.status();
        debug!(status = status.as_u16(), "provider responded");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify(status.as_u16(), error_detail(&body, status)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        response.json::<T>().await.map_err(|e| {
            RelayError::unknown(Some(status), "decode_error", format!("invalid response body: {e}"))
        })
    }

    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = self.url(path);
        let mut items = Vec::new();
        let mut iterator: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).query(&[("limit", LIST_PAGE_LIMIT)]);
            if let Some(iterator) = &iterator {
                request = request.query(&[("iterator", iterator)]);
            }

            let page: ListResponse<T> = self.send_json(request).await?;
            let page_len = page.data.len();
            items.extend(page.data);

            match page.iterator {
                Some(next) if !page.done && page_len > 0 => iterator = Some(next),
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait::async_trait]
impl ProviderApi for HttpProviderApi {
    async fn list_applications(&self) -> Result<Vec<ApplicationOut>> {
        self.list_all("app/").instrument(info_span!("provider.list_applications")).await
    }

    async fn create_application(&self, request: &ApplicationIn) -> Result<ApplicationOut> {
        let span = info_span!("provider.create_application", name = %request.name);
        self.send_json(self.client.post(self.url("app/")).json(request)).instrument(span).await
    }

    async fn create_event_type(&self, request: &EventTypeIn) -> Result<()> {
        let span = info_span!("provider.create_event_type", event_type = %request.name);
        self.send(self.client.post(self.url("event-type/")).json(request))
            .instrument(span)
            .await
            .map(drop)
    }

    async fn list_endpoints(&self, app_id: &str) -> Result<Vec<EndpointOut>> {
        self.list_all(&format!("app/{app_id}/endpoint/"))
            .instrument(info_span!("provider.list_endpoints", app_id))
            .await
    }

    async fn create_endpoint(&self, app_id: &str, request: &EndpointIn) -> Result<EndpointOut> {
        let span = info_span!("provider.create_endpoint", app_id, url = %request.url);
        self.send_json(self.client.post(self.url(&format!("app/{app_id}/endpoint/"))).json(request))
            .instrument(span)
            .await
    }

    async fn create_message(&self, app_id: &str, message: &ProviderMessage) -> Result<()> {
        let span = info_span!(
            "provider.create_message",
            app_id,
            event_id = %message.event_id,
            event_type = %message.event_type
        );
        self.send(self.client.post(self.url(&format!("app/{app_id}/msg/"))).json(message))
            .instrument(span)
            .await
            .map(drop)
    }
}

/// Classifies a request that never produced an HTTP response.
fn transport_error(error: reqwest::Error) -> RelayError {
    if error.is_timeout() {
        RelayError::internal("timeout", format!("provider request timed out: {error}"))
    } else if error.is_builder() {
        RelayError::validation("invalid_request", format!("could not build request: {error}"))
    } else {
        RelayError::internal("transport_error", format!("provider unreachable: {error}"))
    }
}

/// Extracts the human readable detail from a provider error body.
///
/// Prefers the `detail` field of a JSON error document and falls back to
/// the raw body, then to the status reason phrase.
fn error_detail(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(ErrorBody { detail: Some(detail) }) = serde_json::from_str::<ErrorBody>(body) {
        return match detail {
            serde_json::Value::String(detail) => detail,
            other => other.to_string(),
        };
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status.canonical_reason().unwrap_or("no response body").to_string();
    }

    if trimmed.len() > MAX_ERROR_DETAIL_BYTES {
        let mut end = MAX_ERROR_DETAIL_BYTES;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        return format!("{}... (truncated)", &trimmed[..end]);
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use hookrelay_core::EventType;
    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;

    #[test]
    fn message_payload_uses_provider_field_names() {
        let mut data = EventData::new();
        data.insert("user".to_string(), json!({"id": "usr_1"}));
        let event = Event::new("evt_1", EventType::UserCreated, "dev", data);

        let value = serde_json::to_value(ProviderMessage::from_event(&event)).unwrap();

        assert_eq!(
            value,
            json!({"eventId": "evt_1", "eventType": "user.created", "payload": {"user": {"id": "usr_1"}}})
        );
    }

    #[test]
    fn endpoint_request_serializes_filter_types() {
        let request = EndpointIn {
            url: "https://example.com/webhooks/user.created".to_string(),
            description: None,
            filter_types: vec!["user.created".to_string()],
            version: 1,
        };

        let value = serde_json::to_value(request).unwrap();
        assert_eq!(value["filterTypes"], json!(["user.created"]));
        assert!(value.get("description").is_none());
    }

    #[test]
    fn error_detail_prefers_json_detail_field() {
        let body = r#"{"code":"conflict","detail":"Message with this eventId already exists"}"#;
        assert_eq!(
            error_detail(body, StatusCode::CONFLICT),
            "Message with this eventId already exists"
        );
    }

    #[test]
    fn error_detail_renders_structured_detail() {
        let body = r#"{"detail":[{"loc":["body","eventType"],"msg":"field required"}]}"#;
        let detail = error_detail(body, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(detail.contains("field required"));
    }

    #[test]
    fn error_detail_falls_back_to_body_then_reason() {
        assert_eq!(error_detail("upstream exploded", StatusCode::BAD_GATEWAY), "upstream exploded");
        assert_eq!(error_detail("", StatusCode::SERVICE_UNAVAILABLE), "Service Unavailable");

        let long = "x".repeat(4096);
        let detail = error_detail(&long, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(detail.ends_with("... (truncated)"));
        assert!(detail.len() < 1100);
    }

    #[test]
    fn empty_token_is_rejected() {
        let error = HttpProviderApi::new(ProviderConfig::default()).unwrap_err();
        assert_eq!(error.code(), "invalid_configuration");
    }

    #[test]
    fn debug_output_masks_token() {
        let config = ProviderConfig { token: "sk_live_secret".to_string(), ..Default::default() };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk_live_secret"));
    }
}
