//! Delivery client: provider operations wrapped in the retry policy.
//!
//! Every call to the provider goes through the [`Retrier`], so transient
//! failures are absorbed here and only permanent or exhausted errors reach
//! the dispatch task.

use std::{collections::HashSet, sync::Arc};

use hookrelay_core::{
    Clock, DispatchEvent, DuplicateSuppressedEvent, Event, EventHandler, EventType,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::{
    error::{RelayError, Result},
    provider::{ApplicationIn, EndpointIn, EventTypeIn, ProviderApi, ProviderMessage},
    retry::{Retrier, RetryPolicy},
};

/// Endpoint payload version registered for every endpoint.
const ENDPOINT_VERSION: u32 = 1;

/// Settings for application and endpoint provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL endpoints are registered under; the event type name is
    /// appended as the last path segment.
    pub endpoint_base_url: String,

    /// Rate limit applied to newly created applications.
    pub application_rate_limit: Option<u16>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_base_url: "https://example.com/webhooks".to_string(),
            application_rate_limit: Some(1),
        }
    }
}

/// Client for relaying events to the webhook delivery provider.
///
/// Cheap to share behind an `Arc`; holds no per-delivery state.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    api: Arc<dyn ProviderApi>,
    config: ClientConfig,
    retrier: Retrier,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventHandler>,
}

impl DeliveryClient {
    /// Creates a delivery client.
    pub fn new(
        api: Arc<dyn ProviderApi>,
        config: ClientConfig,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventHandler>,
    ) -> Self {
        let retrier = Retrier::new(policy, clock.clone(), events.clone());
        Self { api, config, retrier, clock, events }
    }

    /// Returns the id of the application named `name`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error once retries are exhausted or a
    /// permanent failure occurs.
    #[instrument(skip(self, cancel))]
    pub async fn ensure_application(&self, name: &str, cancel: &CancellationToken) -> Result<String> {
        if let Some(app_id) = self.find_application(name, cancel).await? {
            info!(app_id = %app_id, "application already exists");
            return Ok(app_id);
        }

        let request = ApplicationIn {
            name: name.to_string(),
            rate_limit: self.config.application_rate_limit,
        };

        match self
            .retrier
            .execute_with_cancel("create_application", cancel, || {
                self.api.create_application(&request)
            })
            .await
        {
            Ok(application) => {
                info!(app_id = %application.id, "application created");
                Ok(application.id)
            },
            Err(error) if error.is_duplicate() => {
                debug!("application created concurrently, resolving existing id");
                self.find_application(name, cancel).await?.ok_or_else(|| {
                    RelayError::not_found(
                        "application_not_found",
                        format!("application {name} reported as existing but not listed"),
                    )
                })
            },
            Err(error) => {
                error!(error = %error, "failed to create application");
                Err(error)
            },
        }
    }

    async fn find_application(&self, name: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        let applications = self
            .retrier
            .execute_with_cancel("list_applications", cancel, || self.api.list_applications())
            .await?;

        Ok(applications.into_iter().find(|app| app.name == name).map(|app| app.id))
    }

    /// Registers every supported event type and one endpoint per type.
    ///
    /// Event types and endpoints that already exist are left untouched, so
    /// provisioning is safe to repeat on every start.
    ///
    /// # Errors
    ///
    /// Returns the first provider error that is neither retried away nor a
    /// conflict.
    #[instrument(skip(self, cancel))]
    pub async fn provision_routing(&self, app_id: &str, cancel: &CancellationToken) -> Result<()> {
        for event_type in EventType::ALL {
            let request = EventTypeIn {
                name: event_type.as_str().to_string(),
                description: format!("Event type for {event_type}"),
            };

            match self
                .retrier
                .execute_with_cancel("create_event_type", cancel, || {
                    self.api.create_event_type(&request)
                })
                .await
            {
                Ok(()) => info!(%event_type, "event type created"),
                Err(error) if error.is_duplicate() => debug!(%event_type, "event type already exists"),
                Err(error) => {
                    error!(%event_type, error = %error, "failed to create event type");
                    return Err(error);
                },
            }
        }

        let registered: HashSet<String> = self
            .retrier
            .execute_with_cancel("list_endpoints", cancel, || self.api.list_endpoints(app_id))
            .await?
            .into_iter()
            .map(|endpoint| endpoint.url)
            .collect();

        for event_type in EventType::ALL {
            let url = self.endpoint_url(event_type);
            if registered.contains(&url) {
                debug!(%event_type, url = %url, "endpoint already registered");
                continue;
            }

            let request = EndpointIn {
                url,
                description: Some(format!("Endpoint for {event_type} events")),
                filter_types: vec![event_type.as_str().to_string()],
                version: ENDPOINT_VERSION,
            };

            match self
                .retrier
                .execute_with_cancel("create_endpoint", cancel, || {
                    self.api.create_endpoint(app_id, &request)
                })
                .await
            {
                Ok(endpoint) => info!(%event_type, endpoint_id = %endpoint.id, "endpoint created"),
                Err(error) if error.is_duplicate() => debug!(%event_type, "endpoint already exists"),
                Err(error) => {
                    error!(%event_type, error = %error, "failed to create endpoint");
                    return Err(error);
                },
            }
        }

        Ok(())
    }

    /// Returns the endpoint URL registered for `event_type`.
    pub fn endpoint_url(&self, event_type: EventType) -> String {
        format!("{}/{event_type}", self.config.endpoint_base_url.trim_end_matches('/'))
    }

    /// Sends `event` to the provider application `app_id`.
    ///
    /// A conflict means the provider already accepted a message with this
    /// event id; it is reported as success and emitted as
    /// [`DispatchEvent::DuplicateSuppressed`].
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when delivery fails permanently
    /// or retries are exhausted, or `Internal` (`cancelled`) when `cancel`
    /// fires first.
    #[instrument(
        skip(self, event, cancel),
        fields(event_id = %event.id, event_type = %event.event_type)
    )]
    pub async fn deliver(&self, app_id: &str, event: &Event, cancel: &CancellationToken) -> Result<()> {
        let message = ProviderMessage::from_event(event);

        let result = self
            .retrier
            .execute_with_cancel("send_message", cancel, || self.api.create_message(app_id, &message))
            .await;

        match result {
            Ok(()) => {
                debug!("message accepted by provider");
                Ok(())
            },
            Err(error) if error.is_duplicate() => {
                info!("message already delivered, suppressing duplicate");
                self.events
                    .handle_event(DispatchEvent::DuplicateSuppressed(DuplicateSuppressedEvent {
                        event_id: event.id.clone(),
                        application_id: app_id.to_string(),
                        detected_at: self.clock.now_utc(),
                    }))
                    .await;
                Ok(())
            },
            Err(error) => Err(error),
        }
    }
}
