//! Core domain models for the relay pipeline.
//!
//! Defines the inbound [`Event`], the closed set of supported
//! [`EventType`]s and the immutable [`RoutingTable`] that maps a project to
//! the provider application receiving its events.

use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Arbitrary JSON object carried by an event.
pub type EventData = serde_json::Map<String, serde_json::Value>;

/// Supported upstream event types.
///
/// The wire names are fixed by the upstream publisher and double as the
/// provider's event type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// `subscription.activated`
    #[serde(rename = "subscription.activated")]
    SubscriptionActivated,
    /// `subscription.canceled`
    #[serde(rename = "subscription.canceled")]
    SubscriptionCanceled,
    /// `subscription.created`
    #[serde(rename = "subscription.created")]
    SubscriptionCreated,
    /// `subscription.ended`
    #[serde(rename = "subscription.ended")]
    SubscriptionEnded,
    /// `subscription.renewed`
    #[serde(rename = "subscription.renewed")]
    SubscriptionRenewed,
    /// `subscription.updated`
    #[serde(rename = "subscription.updated")]
    SubscriptionUpdated,
    /// `user.created`
    #[serde(rename = "user.created")]
    UserCreated,
    /// `user.updated`
    #[serde(rename = "user.updated")]
    UserUpdated,
    /// `user.address.created`
    #[serde(rename = "user.address.created")]
    UserAddressCreated,
    /// `user.address.updated`
    #[serde(rename = "user.address.updated")]
    UserAddressUpdated,
    /// `user.address.renewed`
    #[serde(rename = "user.address.renewed")]
    UserAddressRenewed,
    /// `tax_rate.updated`
    #[serde(rename = "tax_rate.updated")]
    TaxRateUpdated,
    /// `tax_rate.created`
    #[serde(rename = "tax_rate.created")]
    TaxRateCreated,
    /// `payment.succeeded`
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded,
}

impl EventType {
    /// Every supported event type, in registration order.
    pub const ALL: [Self; 14] = [
        Self::SubscriptionActivated,
        Self::SubscriptionCanceled,
        Self::SubscriptionCreated,
        Self::SubscriptionEnded,
        Self::SubscriptionRenewed,
        Self::SubscriptionUpdated,
        Self::UserCreated,
        Self::UserUpdated,
        Self::UserAddressCreated,
        Self::UserAddressUpdated,
        Self::UserAddressRenewed,
        Self::TaxRateUpdated,
        Self::TaxRateCreated,
        Self::PaymentSucceeded,
    ];

    /// Returns the wire name of this event type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubscriptionActivated => "subscription.activated",
            Self::SubscriptionCanceled => "subscription.canceled",
            Self::SubscriptionCreated => "subscription.created",
            Self::SubscriptionEnded => "subscription.ended",
            Self::SubscriptionRenewed => "subscription.renewed",
            Self::SubscriptionUpdated => "subscription.updated",
            Self::UserCreated => "user.created",
            Self::UserUpdated => "user.updated",
            Self::UserAddressCreated => "user.address.created",
            Self::UserAddressUpdated => "user.address.updated",
            Self::UserAddressRenewed => "user.address.renewed",
            Self::TaxRateUpdated => "tax_rate.updated",
            Self::TaxRateCreated => "tax_rate.created",
            Self::PaymentSucceeded => "payment.succeeded",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| CoreError::UnknownEventType(s.to_string()))
    }
}

/// An upstream domain event awaiting relay.
///
/// Events are immutable once received. The `id` is assigned upstream and is
/// forwarded to the provider as the message id, which lets the provider
/// reject redeliveries as duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Upstream identifier, e.g. `evt_0123`.
    pub id: String,

    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Project the event belongs to; the routing key.
    #[serde(default)]
    pub project: String,

    /// When the upstream system produced the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Event payload forwarded verbatim to the provider.
    #[serde(default)]
    pub data: EventData,
}

impl Event {
    /// Creates an event without a creation timestamp.
    pub fn new(
        id: impl Into<String>,
        event_type: EventType,
        project: impl Into<String>,
        data: EventData,
    ) -> Self {
        Self { id: id.into(), event_type, project: project.into(), created_at: None, data }
    }

    /// Returns the routing key, or `None` when it is blank.
    pub fn routing_key(&self) -> Option<&str> {
        let project = self.project.trim();
        (!project.is_empty()).then_some(project)
    }
}

/// Immutable mapping from project key to provider application id.
///
/// Built once during provisioning and shared read-only by every dispatch
/// task, so it deliberately exposes no mutation after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    routes: HashMap<String, String>,
}

impl RoutingTable {
    /// Creates an empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the application id registered for `project`.
    pub fn resolve(&self, project: &str) -> Option<&str> {
        self.routes.get(project).map(String::as_str)
    }

    /// Returns the number of routed projects.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no project is routed.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns the routed project keys in sorted order.
    pub fn projects(&self) -> Vec<&str> {
        let mut projects: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        projects.sort_unstable();
        projects
    }
}

impl<K, V> FromIterator<(K, V)> for RoutingTable
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { routes: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}
