use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::canonical::CanonicalId;

/// How an instance is connected to WhatsApp.
///
/// ```
/// use wab_core::TransportKind;
///
/// let t = TransportKind::WebSession;
/// assert_eq!(t.as_str(), "web-session");
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    WebSession,
    BusinessApi,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::WebSession => "web-session",
            TransportKind::BusinessApi => "business-api",
        }
    }
}

/// Lifecycle state of an instance connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Connecting,
    Connected,
    Disconnected,
    Expired,
}

/// Transport occurrences the gateway routes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageReceived,
    MessageUpdated,
    MessageSent,
    ConnectionUpdate,
    PresenceUpdate,
    ContactsUpdate,
}

impl EventKind {
    /// Lowercase identifier used in queue subjects and payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageReceived => "message_received",
            EventKind::MessageUpdated => "message_updated",
            EventKind::MessageSent => "message_sent",
            EventKind::ConnectionUpdate => "connection_update",
            EventKind::PresenceUpdate => "presence_update",
            EventKind::ContactsUpdate => "contacts_update",
        }
    }
}

/// Chatbot integrations the gateway can route conversations to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
    Typebot,
    Chatwoot,
    Dify,
    OpenAi,
}

impl IntegrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationKind::Typebot => "typebot",
            IntegrationKind::Chatwoot => "chatwoot",
            IntegrationKind::Dify => "dify",
            IntegrationKind::OpenAi => "openai",
        }
    }
}

/// Delivery destinations for routed events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Webhook,
    Websocket,
    Queue,
    Chatbot,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Webhook => "webhook",
            SinkKind::Websocket => "websocket",
            SinkKind::Queue => "queue",
            SinkKind::Chatbot => "chatbot",
        }
    }
}

/// Per-instance, per-kind sink settings.
///
/// Read by the dispatcher once per fan-out; edits apply on the next
/// dispatch, never retroactively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub enabled: bool,
    /// Webhook endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Queue subject override; defaults to the canonical event subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Which chatbot backend a chatbot sink routes to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<IntegrationKind>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_backoff_ms() -> u64 {
    250
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl SinkConfig {
    pub fn new(kind: SinkKind) -> Self {
        Self {
            kind,
            enabled: true,
            endpoint: None,
            subject: None,
            integration: None,
            max_retries: 0,
            backoff_ms: default_backoff_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Immutable envelope describing one transport occurrence.
///
/// Constructed once when the raw event is normalized, then shared read-only
/// across every sink so concurrent deliveries cannot interfere with each
/// other. `participant` is `None` only for events no canonical identifier
/// could be derived from; those are still offered to non-chatbot sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedEvent {
    pub instance: String,
    pub kind: EventKind,
    pub participant: Option<CanonicalId>,
    pub payload: Value,
    pub event_id: String,
    pub timestamp: String, // RFC 3339
}

impl RoutedEvent {
    pub fn new(
        instance: impl Into<String>,
        kind: EventKind,
        participant: Option<CanonicalId>,
        payload: Value,
    ) -> Self {
        let timestamp = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".into());
        Self {
            instance: instance.into(),
            kind,
            participant,
            payload,
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
        }
    }

    /// Message text carried by the payload, when present.
    pub fn text(&self) -> Option<&str> {
        self.payload
            .get("message")
            .and_then(|m| m.get("conversation"))
            .and_then(|t| t.as_str())
            .or_else(|| self.payload.get("text").and_then(|t| t.as_str()))
    }
}
