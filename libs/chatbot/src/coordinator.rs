use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use wab_core::{CanonicalId, IntegrationKind};
use wab_session::{SessionKey, SessionRecord, SharedSessionStore, StoreError};
use wab_translator::{to_helpdesk_markdown, to_transport_markup};

use crate::reply::{OutboundReply, ReplySink};
use crate::settings::ChatbotSettings;
use crate::{ChatbotBackend, IntegrationRegistry};

/// What happened to one inbound message for one integration.
#[derive(Debug)]
pub enum TurnOutcome {
    /// A new conversation was opened for this key.
    Started { session: SessionRecord },
    /// The message joined the existing conversation.
    Continued {
        session: SessionRecord,
        reply: Option<String>,
    },
    /// No open session and auto-start is disabled; not forwarded.
    Skipped,
}

/// Failures surfaced by the coordinator. Backend failures are reported
/// distinctly from routing/store problems so operator surfaces can tell
/// them apart.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("no backend registered for integration {}", .0.as_str())]
    NoBackend(IntegrationKind),

    #[error("session store error")]
    Store(#[from] StoreError),

    /// The external chatbot call failed. The session stays open and the
    /// message is not retried, so the backend never sees duplicate turns.
    #[error("chatbot backend call failed")]
    Backend(#[source] anyhow::Error),
}

/// Drives the per-(instance, participant, integration) session state
/// machine: NONE -> OPEN -> CLOSED, with CLOSED terminal.
///
/// All work for one key runs under that key's mutex, so concurrent
/// duplicate deliveries serialize and at most one session-create can win.
pub struct SessionCoordinator {
    store: SharedSessionStore,
    backends: IntegrationRegistry,
    settings: ChatbotSettings,
    reply_sink: Option<Arc<dyn ReplySink>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionCoordinator {
    pub fn new(
        store: SharedSessionStore,
        backends: IntegrationRegistry,
        settings: ChatbotSettings,
    ) -> Self {
        Self {
            store,
            backends,
            settings,
            reply_sink: None,
            locks: DashMap::new(),
        }
    }

    /// Installs the sink that re-injects chatbot replies as outbound
    /// transport events.
    pub fn with_reply_sink(mut self, sink: Arc<dyn ReplySink>) -> Self {
        self.reply_sink = Some(sink);
        self
    }

    fn key_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.cache_key())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Routes one inbound transport message to the given integration.
    pub async fn handle_inbound(
        &self,
        instance: &str,
        participant: &CanonicalId,
        integration: IntegrationKind,
        text: &str,
    ) -> Result<TurnOutcome, CoordinatorError> {
        let key = SessionKey::new(instance, participant.clone(), integration);
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let backend = self
            .backends
            .get(integration)
            .ok_or(CoordinatorError::NoBackend(integration))?;

        // Inbound transport text is converted to the helpdesk dialect before
        // it reaches the backend; the reverse direction happens on replies.
        let message = to_helpdesk_markdown(text);

        match self.store.find(&key).await? {
            Some(session) => {
                self.continue_turn(backend.as_ref(), session, &message).await
            }
            None if !self.settings.auto_start => {
                debug!(key = %key.cache_key(), "auto-start disabled; message not forwarded");
                Ok(TurnOutcome::Skipped)
            }
            None => self.start_turn(backend.as_ref(), &key, &message).await,
        }
    }

    async fn start_turn(
        &self,
        backend: &dyn ChatbotBackend,
        key: &SessionKey,
        message: &str,
    ) -> Result<TurnOutcome, CoordinatorError> {
        let external_ref = backend
            .start_conversation(&key.instance, key.participant.as_str(), message)
            .await
            .map_err(CoordinatorError::Backend)?;

        match self.store.create(key, &external_ref).await {
            Ok(session) => {
                self.store.set_awaiting(session.id, true).await?;
                info!(
                    key = %key.cache_key(),
                    session = %session.id,
                    external_ref = %external_ref,
                    "conversation started"
                );
                Ok(TurnOutcome::Started { session })
            }
            Err(StoreError::Conflict { existing }) => {
                // Another writer won between our find and create. Join the
                // winning session and drop the conversation we just opened.
                warn!(
                    key = %key.cache_key(),
                    winner = %existing.id,
                    "concurrent session create; joining existing session"
                );
                if let Err(err) = backend.close_conversation(&external_ref).await {
                    warn!(error = %err, external_ref = %external_ref, "failed to close orphaned conversation");
                }
                self.continue_turn(backend, existing, message).await
            }
            Err(err) => {
                // The store failed after the backend conversation was opened.
                // Close it best-effort so the external side does not leak.
                if let Err(close_err) = backend.close_conversation(&external_ref).await {
                    warn!(error = %close_err, external_ref = %external_ref, "failed to close orphaned conversation");
                }
                Err(err.into())
            }
        }
    }

    async fn continue_turn(
        &self,
        backend: &dyn ChatbotBackend,
        session: SessionRecord,
        message: &str,
    ) -> Result<TurnOutcome, CoordinatorError> {
        let reply = backend
            .continue_conversation(&session.external_ref, message)
            .await
            .map_err(CoordinatorError::Backend)?;

        self.store.touch(session.id).await?;
        self.store
            .set_awaiting(session.id, reply.is_none())
            .await?;

        if let (Some(text), Some(sink)) = (reply.as_deref(), self.reply_sink.as_ref()) {
            let outbound = OutboundReply {
                instance: session.key.instance.clone(),
                participant: session.key.participant.clone(),
                text: to_transport_markup(text),
            };
            if let Err(err) = sink.send(outbound).await {
                warn!(error = %err, session = %session.id, "failed to re-inject chatbot reply");
            }
        }

        Ok(TurnOutcome::Continued { session, reply })
    }

    /// Explicit close from the backend or an operator. OPEN -> CLOSED;
    /// CLOSED is terminal for the record.
    pub async fn close(
        &self,
        instance: &str,
        participant: &CanonicalId,
        integration: IntegrationKind,
    ) -> Result<bool, CoordinatorError> {
        let key = SessionKey::new(instance, participant.clone(), integration);
        let lock = self.key_lock(&key);
        let guard = lock.lock().await;

        let Some(session) = self.store.find(&key).await? else {
            return Ok(false);
        };
        if let Some(backend) = self.backends.get(integration) {
            if let Err(err) = backend.close_conversation(&session.external_ref).await {
                warn!(error = %err, session = %session.id, "backend close failed; closing locally");
            }
        }
        self.store.close(session.id).await?;
        info!(key = %key.cache_key(), session = %session.id, "conversation closed");
        drop(guard);
        drop(lock);
        self.prune_lock(&key.cache_key());
        Ok(true)
    }

    /// Closes sessions idle past the configured timeout and garbage-collects
    /// closed records past retention. Returns how many sessions were closed.
    ///
    /// Each close runs under the session's key mutex, serialized against any
    /// in-flight turn for that key, and the idle check is repeated under the
    /// lock: a turn that slipped in between the listing and the lock refreshes
    /// the session's activity and spares it from this sweep.
    pub async fn sweep_expired(&self, now: OffsetDateTime) -> Result<usize, CoordinatorError> {
        let expired = self
            .store
            .list_expired(now, self.settings.idle_timeout)
            .await?;
        let mut closed = 0usize;
        for session in expired {
            let lock = self.key_lock(&session.key);
            let guard = lock.lock().await;

            let current = match self.store.find(&session.key).await? {
                Some(record) if record.id == session.id => record,
                _ => continue,
            };
            if now - current.last_activity_at <= self.settings.idle_timeout {
                continue;
            }

            if let Some(backend) = self.backends.get(current.key.integration) {
                if let Err(err) = backend.close_conversation(&current.external_ref).await {
                    warn!(error = %err, session = %current.id, "backend close failed during sweep");
                }
            }
            self.store.close(current.id).await?;
            info!(session = %current.id, key = %current.key.cache_key(), "session timed out");
            closed += 1;

            drop(guard);
            drop(lock);
            self.prune_lock(&session.key.cache_key());
        }
        self.store
            .remove_closed(now - self.settings.retention)
            .await?;
        Ok(closed)
    }

    /// Drops a key's lock entry once nothing else holds it. Waiters keep a
    /// clone of the `Arc`, so a contended entry survives the prune and the
    /// waiter proceeds on the same mutex.
    fn prune_lock(&self, cache_key: &str) {
        self.locks
            .remove_if(cache_key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Tears down every session for a deleted instance. Holds every key
    /// mutex under the instance prefix while deleting, so no in-flight turn
    /// observes a half-removed session.
    pub async fn teardown_instance(&self, instance: &str) -> Result<usize, CoordinatorError> {
        let prefix = format!("{instance}:");
        let key_locks: Vec<Arc<Mutex<()>>> = self
            .locks
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.value().clone())
            .collect();
        let mut guards = Vec::with_capacity(key_locks.len());
        for lock in &key_locks {
            guards.push(lock.lock().await);
        }

        let removed = self.store.delete_for_instance(instance).await?;

        drop(guards);
        drop(key_locks);
        self.locks.retain(|key, lock| {
            !(key.starts_with(&prefix) && Arc::strong_count(lock) == 1)
        });
        Ok(removed)
    }
}
