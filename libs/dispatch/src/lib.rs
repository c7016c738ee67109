//! Event fan-out: the sink adapter contract, the built-in sink
//! implementations, and the dispatcher that delivers each routed event to
//! every enabled sink concurrently.

mod chatbot_sink;
mod dispatcher;
mod queue;
mod webhook;
mod websocket;

use async_trait::async_trait;
use wab_core::{RoutedEvent, SinkConfig, SinkKind};

pub use chatbot_sink::ChatbotSink;
pub use dispatcher::{DispatchError, DispatchReport, EventDispatcher};
pub use queue::QueueSink;
pub use webhook::WebhookSink;
pub use websocket::WebsocketSink;

/// How a single delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Delivery was intentionally not attempted (sink not applicable to
    /// this event). Counts as success for the fan-out.
    Skipped,
    Failed { code: &'static str, detail: String },
}

/// Result of delivering one event to one sink. Failures are data, not
/// errors; one sink's failure never aborts the others.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub sink: SinkKind,
    pub outcome: DeliveryOutcome,
}

impl DeliveryResult {
    pub fn delivered(sink: SinkKind) -> Self {
        Self {
            sink,
            outcome: DeliveryOutcome::Delivered,
        }
    }

    pub fn skipped(sink: SinkKind) -> Self {
        Self {
            sink,
            outcome: DeliveryOutcome::Skipped,
        }
    }

    pub fn failed(sink: SinkKind, code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            sink,
            outcome: DeliveryOutcome::Failed {
                code,
                detail: detail.into(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Failed { .. })
    }
}

/// One delivery destination. Implementations own their transport and their
/// retry policy; the dispatcher only bounds the whole attempt with the
/// configured timeout.
#[async_trait]
pub trait SinkAdapter: Send + Sync {
    fn kind(&self) -> SinkKind;

    async fn deliver(&self, config: &SinkConfig, event: &RoutedEvent) -> DeliveryResult;
}
