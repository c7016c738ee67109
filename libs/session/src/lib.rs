mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

use std::{env, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
#[cfg(not(feature = "redis-store"))]
use tracing::warn;
use uuid::Uuid;
use wab_core::{CanonicalId, IntegrationKind};

pub use memory::MemorySessionStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisSessionStore;

/// Shared session store handle used across the gateway.
pub type SharedSessionStore = Arc<dyn SessionStore>;

/// Scope of one conversation with one chatbot integration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub instance: String,
    pub participant: CanonicalId,
    pub integration: IntegrationKind,
}

impl SessionKey {
    pub fn new(
        instance: impl Into<String>,
        participant: CanonicalId,
        integration: IntegrationKind,
    ) -> Self {
        Self {
            instance: instance.into(),
            participant,
            integration,
        }
    }

    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.instance,
            self.participant.as_str(),
            self.integration.as_str()
        )
    }
}

/// Lifecycle status of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Opened,
    Paused,
    Closed,
}

impl SessionStatus {
    /// An active session blocks the creation of a second one for its key.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Opened | SessionStatus::Paused)
    }
}

/// One ongoing conversation between a participant and a chatbot integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub key: SessionKey,
    /// Conversation reference owned by the external chatbot backend.
    pub external_ref: String,
    pub status: SessionStatus,
    pub awaiting_input: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity_at: OffsetDateTime,
}

impl SessionRecord {
    pub fn new(key: SessionKey, external_ref: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            key,
            external_ref: external_ref.into(),
            status: SessionStatus::Opened,
            awaiting_input: false,
            created_at: now,
            last_activity_at: now,
        }
    }
}

/// Failures surfaced by session store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An active session already exists for the key. Carries the winning
    /// record so callers can join it instead of failing.
    #[error("an active session already exists for {}", existing.key.cache_key())]
    Conflict { existing: SessionRecord },

    #[error("session {0} not found")]
    NotFound(Uuid),

    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Durable mapping from (instance, participant, integration) to the active
/// conversation session.
///
/// Implementations must be safe under concurrent calls for different keys;
/// same-key callers are serialized by the coordinator, so backends only need
/// the `create` conflict check to be atomic.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the active (opened or paused) session for the key, if any.
    async fn find(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError>;

    /// Creates a new opened session. Fails with [`StoreError::Conflict`] when
    /// an active session already exists for the key.
    async fn create(&self, key: &SessionKey, external_ref: &str)
        -> Result<SessionRecord, StoreError>;

    /// Refreshes `last_activity_at`.
    async fn touch(&self, id: Uuid) -> Result<(), StoreError>;

    async fn set_awaiting(&self, id: Uuid, awaiting: bool) -> Result<(), StoreError>;

    /// Closes the session. Closed is terminal; the key becomes free for a
    /// fresh session.
    async fn close(&self, id: Uuid) -> Result<(), StoreError>;

    /// Active sessions whose last activity is older than `idle` at `now`.
    async fn list_expired(
        &self,
        now: OffsetDateTime,
        idle: Duration,
    ) -> Result<Vec<SessionRecord>, StoreError>;

    /// Garbage-collects closed records older than `before`. Returns how many
    /// were removed.
    async fn remove_closed(&self, before: OffsetDateTime) -> Result<usize, StoreError>;

    /// Tears down every session belonging to a deleted instance.
    async fn delete_for_instance(&self, instance: &str) -> Result<usize, StoreError>;
}

/// Returns an in-memory session store wrapped in an [`Arc`].
pub fn shared_memory_store() -> SharedSessionStore {
    Arc::new(MemorySessionStore::new())
}

/// Builds a session store from environment variables.
///
/// If `SESSION_REDIS_URL` is present and the `redis-store` feature is
/// enabled, a Redis-backed store is created. Otherwise the in-memory
/// implementation is used.
pub async fn store_from_env() -> Result<SharedSessionStore> {
    match env::var("SESSION_REDIS_URL") {
        Ok(url) => {
            let namespace = env::var("SESSION_NAMESPACE").unwrap_or_else(|_| "wab".into());
            build_redis_store(&url, &namespace).await
        }
        Err(_) => Ok(shared_memory_store()),
    }
}

#[cfg(feature = "redis-store")]
async fn build_redis_store(url: &str, namespace: &str) -> Result<SharedSessionStore> {
    let store = RedisSessionStore::connect(url, namespace).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-store"))]
async fn build_redis_store(_url: &str, _namespace: &str) -> Result<SharedSessionStore> {
    warn!("redis-store feature disabled; using in-memory session store");
    Ok(shared_memory_store())
}
