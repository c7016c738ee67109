use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use wab_core::{RoutedEvent, SinkConfig, SinkKind};

use crate::{DeliveryResult, SinkAdapter};

/// Delivers events as JSON POSTs to the instance's configured endpoint.
///
/// Retries transient failures up to `max_retries` with exponential backoff
/// starting at `backoff_ms`. A 4xx response is not retried; the endpoint has
/// rejected the payload and will keep rejecting it.
pub struct WebhookSink {
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    async fn attempt(&self, endpoint: &str, event: &RoutedEvent) -> Result<(), AttemptError> {
        let response = self
            .client
            .post(endpoint)
            .json(event)
            .send()
            .await
            .map_err(|err| AttemptError::Transient(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            Err(AttemptError::Rejected(status.as_u16()))
        } else {
            Err(AttemptError::Transient(format!("status {status}")))
        }
    }
}

enum AttemptError {
    Transient(String),
    Rejected(u16),
}

#[async_trait]
impl SinkAdapter for WebhookSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Webhook
    }

    async fn deliver(&self, config: &SinkConfig, event: &RoutedEvent) -> DeliveryResult {
        let Some(endpoint) = config.endpoint.as_deref() else {
            return DeliveryResult::failed(SinkKind::Webhook, "E_CONFIG", "no endpoint configured");
        };

        let mut backoff = Duration::from_millis(config.backoff_ms);
        let mut last_error = String::new();
        for attempt in 0..=config.max_retries {
            match self.attempt(endpoint, event).await {
                Ok(()) => {
                    debug!(
                        instance = %event.instance,
                        event_id = %event.event_id,
                        endpoint,
                        attempt,
                        "webhook delivered"
                    );
                    return DeliveryResult::delivered(SinkKind::Webhook);
                }
                Err(AttemptError::Rejected(status)) => {
                    warn!(
                        instance = %event.instance,
                        event_id = %event.event_id,
                        status,
                        "webhook rejected; not retrying"
                    );
                    return DeliveryResult::failed(
                        SinkKind::Webhook,
                        "E_REJECTED",
                        format!("endpoint returned {status}"),
                    );
                }
                Err(AttemptError::Transient(detail)) => {
                    warn!(
                        instance = %event.instance,
                        event_id = %event.event_id,
                        attempt,
                        error = %detail,
                        "webhook attempt failed"
                    );
                    last_error = detail;
                }
            }
            if attempt < config.max_retries {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        DeliveryResult::failed(SinkKind::Webhook, "E_SEND", last_error)
    }
}
