use async_trait::async_trait;
use tracing::debug;
use wab_core::{event_subject, RoutedEvent, SinkConfig, SinkKind};

use crate::{DeliveryResult, SinkAdapter};

/// Publishes events to NATS, either on the canonical per-instance subject
/// or on the subject override from the sink config.
pub struct QueueSink {
    client: async_nats::Client,
}

impl QueueSink {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = async_nats::connect(url).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SinkAdapter for QueueSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Queue
    }

    async fn deliver(&self, config: &SinkConfig, event: &RoutedEvent) -> DeliveryResult {
        let subject = config
            .subject
            .clone()
            .unwrap_or_else(|| event_subject(&event.instance, event.kind));

        let payload = match serde_json::to_vec(event) {
            Ok(bytes) => bytes,
            Err(err) => {
                return DeliveryResult::failed(SinkKind::Queue, "E_ENCODE", err.to_string());
            }
        };

        match self.client.publish(subject.clone(), payload.into()).await {
            Ok(()) => {
                debug!(
                    instance = %event.instance,
                    event_id = %event.event_id,
                    subject = %subject,
                    "event published"
                );
                DeliveryResult::delivered(SinkKind::Queue)
            }
            Err(err) => DeliveryResult::failed(SinkKind::Queue, "E_PUBLISH", err.to_string()),
        }
    }
}
