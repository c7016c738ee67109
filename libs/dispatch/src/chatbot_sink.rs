use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use wab_chatbot::{CoordinatorError, SessionCoordinator, TurnOutcome};
use wab_core::{EventKind, RoutedEvent, SinkConfig, SinkKind};

use crate::{DeliveryResult, SinkAdapter};

/// Routes inbound messages into the chatbot session coordinator.
///
/// Only `message_received` events carry a conversation turn; every other
/// event kind is skipped. Events with no canonical participant cannot be
/// tied to a session and are skipped here while the remaining sinks still
/// receive them.
pub struct ChatbotSink {
    coordinator: Arc<SessionCoordinator>,
}

impl ChatbotSink {
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl SinkAdapter for ChatbotSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Chatbot
    }

    async fn deliver(&self, config: &SinkConfig, event: &RoutedEvent) -> DeliveryResult {
        if event.kind != EventKind::MessageReceived {
            return DeliveryResult::skipped(SinkKind::Chatbot);
        }
        let Some(integration) = config.integration else {
            return DeliveryResult::failed(
                SinkKind::Chatbot,
                "E_CONFIG",
                "no integration configured",
            );
        };
        let Some(participant) = event.participant.as_ref() else {
            warn!(
                instance = %event.instance,
                event_id = %event.event_id,
                "no canonical participant; message not routed to chatbot"
            );
            return DeliveryResult::skipped(SinkKind::Chatbot);
        };
        let Some(text) = event.text() else {
            return DeliveryResult::skipped(SinkKind::Chatbot);
        };

        match self
            .coordinator
            .handle_inbound(&event.instance, participant, integration, text)
            .await
        {
            Ok(TurnOutcome::Started { .. }) | Ok(TurnOutcome::Continued { .. }) => {
                DeliveryResult::delivered(SinkKind::Chatbot)
            }
            Ok(TurnOutcome::Skipped) => DeliveryResult::skipped(SinkKind::Chatbot),
            Err(CoordinatorError::NoBackend(kind)) => DeliveryResult::failed(
                SinkKind::Chatbot,
                "E_NO_BACKEND",
                format!("no backend for {}", kind.as_str()),
            ),
            Err(CoordinatorError::Store(err)) => {
                DeliveryResult::failed(SinkKind::Chatbot, "E_STORE", err.to_string())
            }
            Err(CoordinatorError::Backend(err)) => {
                DeliveryResult::failed(SinkKind::Chatbot, "E_BACKEND", format!("{err:#}"))
            }
        }
    }
}
