use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;
use wab_core::{RoutedEvent, SinkConfig, SinkKind};

use crate::{DeliveryResult, SinkAdapter};

const DEFAULT_CAPACITY: usize = 256;

/// Pushes events to connected websocket subscribers over a broadcast
/// channel. The socket layer subscribes per connection; lagging readers
/// drop old events rather than stall the fan-out. Clones share the
/// underlying channel.
#[derive(Clone)]
pub struct WebsocketSink {
    tx: broadcast::Sender<RoutedEvent>,
}

impl WebsocketSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// A fresh subscription for one socket connection.
    pub fn subscribe(&self) -> broadcast::Receiver<RoutedEvent> {
        self.tx.subscribe()
    }
}

impl Default for WebsocketSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SinkAdapter for WebsocketSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Websocket
    }

    async fn deliver(&self, _config: &SinkConfig, event: &RoutedEvent) -> DeliveryResult {
        // send only fails when there are no subscribers; an empty room is
        // not a delivery failure.
        match self.tx.send(event.clone()) {
            Ok(receivers) => {
                debug!(
                    instance = %event.instance,
                    event_id = %event.event_id,
                    receivers,
                    "websocket event broadcast"
                );
            }
            Err(_) => {
                debug!(
                    instance = %event.instance,
                    event_id = %event.event_id,
                    "no websocket subscribers"
                );
            }
        }
        DeliveryResult::delivered(SinkKind::Websocket)
    }
}
