use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};
use wab_core::{InstanceRegistry, RoutedEvent, SinkConfig, SinkKind};
use wab_telemetry::TelemetryLabels;

use crate::{DeliveryOutcome, DeliveryResult, SinkAdapter};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The instance is absent or not in `Connected` state; the event is
    /// refused before any sink sees it.
    #[error("instance {0} is not accepting events")]
    NotAccepting(String),
}

/// Per-event fan-out summary.
#[derive(Debug)]
pub struct DispatchReport {
    pub event_id: String,
    pub results: Vec<DeliveryResult>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == DeliveryOutcome::Delivered)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }

    pub fn result_for(&self, sink: SinkKind) -> Option<&DeliveryResult> {
        self.results.iter().find(|r| r.sink == sink)
    }
}

/// Fans each routed event out to the instance's enabled sinks.
///
/// The sink set is read once per event; config edits apply from the next
/// dispatch onward. Deliveries run concurrently and independently, each
/// bounded by its sink's configured timeout, so one slow or failing sink
/// never delays or suppresses the others.
pub struct EventDispatcher {
    registry: Arc<InstanceRegistry>,
    adapters: HashMap<SinkKind, Arc<dyn SinkAdapter>>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self {
            registry,
            adapters: HashMap::new(),
        }
    }

    pub fn with_sink(mut self, adapter: Arc<dyn SinkAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub async fn dispatch(&self, event: RoutedEvent) -> Result<DispatchReport, DispatchError> {
        if !self.registry.accepting(&event.instance) {
            warn!(
                instance = %event.instance,
                event_id = %event.event_id,
                "event refused; instance not connected"
            );
            return Err(DispatchError::NotAccepting(event.instance));
        }

        let configs = self
            .registry
            .get(&event.instance)
            .map(|instance| instance.enabled_sinks())
            .unwrap_or_default();

        let event = Arc::new(event);
        let deliveries = configs.into_iter().map(|config| {
            let event = event.clone();
            let adapter = self.adapters.get(&config.kind).cloned();
            async move { Self::deliver_one(adapter, config, &event).await }
        });
        let results = join_all(deliveries).await;

        for result in &results {
            let mut labels = TelemetryLabels::new(event.instance.clone());
            labels.sink = Some(result.sink.as_str().into());
            labels.event_id = Some(event.event_id.clone());
            match &result.outcome {
                DeliveryOutcome::Failed { code, detail } => {
                    labels.extra.push(("code".into(), (*code).into()));
                    warn!(
                        instance = %event.instance,
                        event_id = %event.event_id,
                        sink = %result.sink.as_str(),
                        code,
                        detail = %detail,
                        "sink delivery failed"
                    );
                    wab_telemetry::record_counter("sink_failed", 1, &labels);
                }
                _ => {
                    wab_telemetry::record_counter("sink_delivered", 1, &labels);
                }
            }
        }

        let report = DispatchReport {
            event_id: event.event_id.clone(),
            results,
        };
        info!(
            instance = %event.instance,
            event_id = %event.event_id,
            kind = %event.kind.as_str(),
            delivered = report.delivered(),
            failed = report.failed(),
            "event dispatched"
        );
        Ok(report)
    }

    async fn deliver_one(
        adapter: Option<Arc<dyn SinkAdapter>>,
        config: SinkConfig,
        event: &RoutedEvent,
    ) -> DeliveryResult {
        let Some(adapter) = adapter else {
            return DeliveryResult::failed(config.kind, "E_NO_ADAPTER", "sink not wired");
        };
        let budget = Duration::from_millis(config.timeout_ms);
        match tokio::time::timeout(budget, adapter.deliver(&config, event)).await {
            Ok(result) => result,
            Err(_) => DeliveryResult::failed(
                config.kind,
                "E_TIMEOUT",
                format!("no result within {}ms", config.timeout_ms),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wab_core::{EventKind, InstanceState, TransportKind};

    struct FakeSink {
        kind: SinkKind,
        fail: bool,
        slow: bool,
        calls: AtomicUsize,
    }

    impl FakeSink {
        fn new(kind: SinkKind) -> Self {
            Self {
                kind,
                fail: false,
                slow: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(kind: SinkKind) -> Self {
            Self {
                fail: true,
                ..Self::new(kind)
            }
        }

        fn slow(kind: SinkKind) -> Self {
            Self {
                slow: true,
                ..Self::new(kind)
            }
        }
    }

    #[async_trait]
    impl SinkAdapter for FakeSink {
        fn kind(&self) -> SinkKind {
            self.kind
        }

        async fn deliver(&self, _config: &SinkConfig, _event: &RoutedEvent) -> DeliveryResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.slow {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail {
                DeliveryResult::failed(self.kind, "E_SEND", "forced failure")
            } else {
                DeliveryResult::delivered(self.kind)
            }
        }
    }

    fn connected_registry(sinks: Vec<SinkConfig>) -> Arc<InstanceRegistry> {
        let registry = Arc::new(InstanceRegistry::new());
        registry
            .provision("acme", TransportKind::WebSession, sinks)
            .unwrap();
        registry.set_state("acme", InstanceState::Connected);
        registry
    }

    fn event() -> RoutedEvent {
        RoutedEvent::new("acme", EventKind::MessageReceived, None, json!({"text": "x"}))
    }

    #[tokio::test]
    async fn one_failing_sink_does_not_block_the_others() {
        let configs = vec![
            SinkConfig::new(SinkKind::Webhook),
            SinkConfig::new(SinkKind::Queue),
            SinkConfig::new(SinkKind::Websocket),
        ];
        let webhook = Arc::new(FakeSink::new(SinkKind::Webhook));
        let queue = Arc::new(FakeSink::failing(SinkKind::Queue));
        let websocket = Arc::new(FakeSink::new(SinkKind::Websocket));

        let dispatcher = EventDispatcher::new(connected_registry(configs))
            .with_sink(webhook.clone())
            .with_sink(queue.clone())
            .with_sink(websocket.clone());

        let report = dispatcher.dispatch(event()).await.unwrap();
        assert_eq!(report.delivered(), 2);
        assert_eq!(report.failed(), 1);
        assert!(report.result_for(SinkKind::Queue).unwrap().is_failure());
        assert_eq!(webhook.calls.load(Ordering::SeqCst), 1);
        assert_eq!(websocket.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_sinks_are_not_attempted() {
        let mut disabled = SinkConfig::new(SinkKind::Queue);
        disabled.enabled = false;
        let configs = vec![SinkConfig::new(SinkKind::Webhook), disabled];
        let webhook = Arc::new(FakeSink::new(SinkKind::Webhook));
        let queue = Arc::new(FakeSink::new(SinkKind::Queue));

        let dispatcher = EventDispatcher::new(connected_registry(configs))
            .with_sink(webhook.clone())
            .with_sink(queue.clone());

        let report = dispatcher.dispatch(event()).await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(queue.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn events_for_disconnected_instances_are_refused() {
        let registry = Arc::new(InstanceRegistry::new());
        registry
            .provision("acme", TransportKind::WebSession, vec![])
            .unwrap();
        let dispatcher = EventDispatcher::new(registry);

        let err = dispatcher.dispatch(event()).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotAccepting(name) if name == "acme"));
    }

    #[tokio::test]
    async fn slow_sinks_are_bounded_by_their_timeout() {
        let mut config = SinkConfig::new(SinkKind::Webhook);
        config.timeout_ms = 100;
        let slow = Arc::new(FakeSink::slow(SinkKind::Webhook));
        let dispatcher =
            EventDispatcher::new(connected_registry(vec![config])).with_sink(slow.clone());

        let report = dispatcher.dispatch(event()).await.unwrap();
        let result = report.result_for(SinkKind::Webhook).unwrap();
        match &result.outcome {
            DeliveryOutcome::Failed { code, .. } => assert_eq!(*code, "E_TIMEOUT"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unwired_sink_kinds_report_a_config_failure() {
        let dispatcher =
            EventDispatcher::new(connected_registry(vec![SinkConfig::new(SinkKind::Queue)]));
        let report = dispatcher.dispatch(event()).await.unwrap();
        assert_eq!(report.failed(), 1);
    }
}
