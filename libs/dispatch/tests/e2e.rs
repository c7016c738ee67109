//! Full inbound path: a group message arrives for a connected instance,
//! fans out to every enabled sink, starts a chatbot conversation, and a
//! concurrent duplicate joins the same session.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wab_chatbot::{
    ChatbotBackend, ChatbotSettings, IntegrationRegistry, SessionCoordinator,
};
use wab_core::{
    canonical_participant, EventKind, InstanceRegistry, InstanceState, IntegrationKind,
    RoutedEvent, SinkConfig, SinkKind, TransportKind,
};
use wab_dispatch::{ChatbotSink, EventDispatcher, WebhookSink, WebsocketSink};
use wab_session::shared_memory_store;

struct CountingBackend {
    starts: AtomicUsize,
}

#[async_trait]
impl ChatbotBackend for CountingBackend {
    async fn start_conversation(
        &self,
        instance: &str,
        participant: &str,
        _message: &str,
    ) -> anyhow::Result<String> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(format!("flow-{instance}-{participant}-{n}"))
    }

    async fn continue_conversation(
        &self,
        _external_ref: &str,
        _message: &str,
    ) -> anyhow::Result<Option<String>> {
        Ok(Some("next question".into()))
    }

    async fn close_conversation(&self, _external_ref: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn inbound_event() -> RoutedEvent {
    let payload = json!({
        "key": { "remoteJid": "123@g.us" },
        "message": { "conversation": "hello *there*" },
    });
    let participant = canonical_participant(&payload).ok();
    RoutedEvent::new("tenant-a", EventKind::MessageReceived, participant, payload)
}

fn gateway() -> (EventDispatcher, Arc<CountingBackend>, WebsocketSink) {
    let registry = Arc::new(InstanceRegistry::new());
    let mut chatbot_cfg = SinkConfig::new(SinkKind::Chatbot);
    chatbot_cfg.integration = Some(IntegrationKind::Typebot);
    registry
        .provision(
            "tenant-a",
            TransportKind::WebSession,
            vec![SinkConfig::new(SinkKind::Websocket), chatbot_cfg],
        )
        .unwrap();
    registry.set_state("tenant-a", InstanceState::Connected);

    let backend = Arc::new(CountingBackend {
        starts: AtomicUsize::new(0),
    });
    let integrations = IntegrationRegistry::new();
    integrations.register(IntegrationKind::Typebot, backend.clone());
    let coordinator = Arc::new(SessionCoordinator::new(
        shared_memory_store(),
        integrations,
        ChatbotSettings::default(),
    ));

    let websocket = WebsocketSink::new();
    let dispatcher = EventDispatcher::new(registry)
        .with_sink(Arc::new(ChatbotSink::new(coordinator)))
        .with_sink(Arc::new(websocket.clone()));

    (dispatcher, backend, websocket)
}

#[tokio::test]
async fn group_message_fans_out_and_starts_one_session() {
    let (dispatcher, backend, websocket) = gateway();
    let mut socket_rx = websocket.subscribe();

    let report = dispatcher.dispatch(inbound_event()).await.unwrap();
    assert_eq!(report.failed(), 0);
    assert_eq!(report.delivered(), 2);

    let pushed = socket_rx.recv().await.unwrap();
    assert_eq!(pushed.instance, "tenant-a");
    assert_eq!(
        pushed.participant.as_ref().map(|p| p.as_str()),
        Some("123@g.us")
    );
    assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_duplicate_events_share_one_session() {
    let (dispatcher, backend, _websocket) = gateway();
    let dispatcher = Arc::new(dispatcher);

    let a = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(inbound_event()).await })
    };
    let b = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(inbound_event()).await })
    };

    let report_a = a.await.unwrap().unwrap();
    let report_b = b.await.unwrap().unwrap();
    assert_eq!(report_a.failed(), 0);
    assert_eq!(report_b.failed(), 0);
    assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
}

// Full scenario with a real webhook endpoint: the event reaches both the
// webhook and the chatbot, and a concurrent duplicate still yields exactly
// one session. Skips if binding to localhost is not permitted in the
// current environment.
#[tokio::test]
async fn webhook_and_chatbot_both_receive_the_event() {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("skipping webhook_and_chatbot_both_receive_the_event: {err}");
            return;
        }
    };
    let addr: SocketAddr = listener.local_addr().unwrap();

    let (tx, rx) = oneshot::channel::<Value>();
    let tx = Arc::new(std::sync::Mutex::new(Some(tx)));
    let app = Router::new().route(
        "/hook",
        post({
            let tx = tx.clone();
            move |Json(payload): Json<Value>| {
                let tx = tx.clone();
                async move {
                    if let Some(sender) = tx.lock().unwrap().take() {
                        let _ = sender.send(payload);
                    }
                    Json(())
                }
            }
        }),
    );
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app.into_make_service()).await {
            eprintln!("webhook mock server error: {err}");
        }
    });

    let registry = Arc::new(InstanceRegistry::new());
    let mut webhook_cfg = SinkConfig::new(SinkKind::Webhook);
    webhook_cfg.endpoint = Some(format!("http://{addr}/hook"));
    let mut chatbot_cfg = SinkConfig::new(SinkKind::Chatbot);
    chatbot_cfg.integration = Some(IntegrationKind::Typebot);
    registry
        .provision(
            "tenant-a",
            TransportKind::WebSession,
            vec![webhook_cfg, chatbot_cfg],
        )
        .unwrap();
    registry.set_state("tenant-a", InstanceState::Connected);

    let backend = Arc::new(CountingBackend {
        starts: AtomicUsize::new(0),
    });
    let integrations = IntegrationRegistry::new();
    integrations.register(IntegrationKind::Typebot, backend.clone());
    let coordinator = Arc::new(SessionCoordinator::new(
        shared_memory_store(),
        integrations,
        ChatbotSettings::default(),
    ));

    let dispatcher = Arc::new(
        EventDispatcher::new(registry)
            .with_sink(Arc::new(WebhookSink::new().unwrap()))
            .with_sink(Arc::new(ChatbotSink::new(coordinator))),
    );

    let a = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(inbound_event()).await })
    };
    let b = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(inbound_event()).await })
    };
    assert_eq!(a.await.unwrap().unwrap().failed(), 0);
    assert_eq!(b.await.unwrap().unwrap().failed(), 0);

    let posted = tokio::time::timeout(std::time::Duration::from_secs(2), rx)
        .await
        .expect("webhook should be hit")
        .unwrap();
    assert_eq!(posted["instance"], "tenant-a");
    assert_eq!(posted["kind"], "message_received");
    assert_eq!(posted["payload"]["key"]["remoteJid"], "123@g.us");
    assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn events_are_refused_until_the_instance_connects() {
    let registry = Arc::new(InstanceRegistry::new());
    registry
        .provision("tenant-b", TransportKind::WebSession, vec![])
        .unwrap();
    let dispatcher = EventDispatcher::new(registry.clone());

    let event = RoutedEvent::new("tenant-b", EventKind::MessageReceived, None, json!({}));
    assert!(dispatcher.dispatch(event).await.is_err());

    registry.set_state("tenant-b", InstanceState::Connected);
    let event = RoutedEvent::new("tenant-b", EventKind::MessageReceived, None, json!({}));
    assert!(dispatcher.dispatch(event).await.is_ok());
}
