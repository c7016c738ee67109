use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{SessionKey, SessionRecord, SessionStatus, SessionStore, StoreError};

/// Redis-backed session store.
///
/// Closed sessions are deleted immediately instead of being retained for a
/// GC window, so [`SessionStore::remove_closed`] is a no-op here.
pub struct RedisSessionStore {
    namespace: String,
    connection: Mutex<redis::aio::ConnectionManager>,
}

impl RedisSessionStore {
    pub async fn connect(url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            namespace: namespace.into(),
            connection: Mutex::new(manager),
        })
    }

    fn session_key(&self, id: Uuid) -> String {
        format!("{}:session:{}", self.namespace, id)
    }

    fn active_key(&self, key: &SessionKey) -> String {
        format!("{}:active:{}", self.namespace, key.cache_key())
    }

    fn activity_key(&self) -> String {
        format!("{}:activity", self.namespace)
    }

    fn instance_key(&self, instance: &str) -> String {
        format!("{}:instance:{}", self.namespace, instance)
    }

    async fn load(
        &self,
        conn: &mut redis::aio::ConnectionManager,
        id: Uuid,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let raw: Option<String> = conn
            .get(self.session_key(id))
            .await
            .map_err(unavailable)?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|err| StoreError::Unavailable(err.to_string())),
            None => Ok(None),
        }
    }

    async fn persist(
        &self,
        conn: &mut redis::aio::ConnectionManager,
        record: &SessionRecord,
    ) -> Result<(), StoreError> {
        let payload =
            serde_json::to_string(record).map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let _: () = conn
            .set(self.session_key(record.id), payload)
            .await
            .map_err(unavailable)?;
        let _: () = conn
            .zadd(
                self.activity_key(),
                record.id.to_string(),
                record.last_activity_at.unix_timestamp(),
            )
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn forget(
        &self,
        conn: &mut redis::aio::ConnectionManager,
        record: &SessionRecord,
    ) -> Result<(), StoreError> {
        let _: () = conn
            .del(self.session_key(record.id))
            .await
            .map_err(unavailable)?;
        let _: () = conn
            .zrem(self.activity_key(), record.id.to_string())
            .await
            .map_err(unavailable)?;
        let _: () = conn
            .srem(self.instance_key(&record.key.instance), record.id.to_string())
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(err: redis::RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn find(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
        let mut conn = self.connection.lock().await;
        let id: Option<String> = conn.get(self.active_key(key)).await.map_err(unavailable)?;
        match id.and_then(|raw| Uuid::parse_str(&raw).ok()) {
            Some(id) => self.load(&mut conn, id).await,
            None => Ok(None),
        }
    }

    async fn create(
        &self,
        key: &SessionKey,
        external_ref: &str,
    ) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord::new(key.clone(), external_ref);
        let mut conn = self.connection.lock().await;

        // SET NX makes the conflict check atomic across processes.
        let claimed: bool = conn
            .set_nx(self.active_key(key), record.id.to_string())
            .await
            .map_err(unavailable)?;
        if !claimed {
            let id: Option<String> = conn.get(self.active_key(key)).await.map_err(unavailable)?;
            let existing = match id.and_then(|raw| Uuid::parse_str(&raw).ok()) {
                Some(id) => self.load(&mut conn, id).await?,
                None => None,
            };
            return match existing {
                Some(existing) => Err(StoreError::Conflict { existing }),
                // The winner vanished between the two reads; report the key
                // as busy so the caller retries its find.
                None => Err(StoreError::Unavailable("active session moved".into())),
            };
        }

        self.persist(&mut conn, &record).await?;
        let _: () = conn
            .sadd(self.instance_key(&key.instance), record.id.to_string())
            .await
            .map_err(unavailable)?;
        Ok(record)
    }

    async fn touch(&self, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.connection.lock().await;
        let mut record = self.load(&mut conn, id).await?.ok_or(StoreError::NotFound(id))?;
        record.last_activity_at = OffsetDateTime::now_utc();
        self.persist(&mut conn, &record).await
    }

    async fn set_awaiting(&self, id: Uuid, awaiting: bool) -> Result<(), StoreError> {
        let mut conn = self.connection.lock().await;
        let mut record = self.load(&mut conn, id).await?.ok_or(StoreError::NotFound(id))?;
        record.awaiting_input = awaiting;
        self.persist(&mut conn, &record).await
    }

    async fn close(&self, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.connection.lock().await;
        let mut record = self.load(&mut conn, id).await?.ok_or(StoreError::NotFound(id))?;
        record.status = SessionStatus::Closed;

        let active: Option<String> = conn
            .get(self.active_key(&record.key))
            .await
            .map_err(unavailable)?;
        if active.as_deref() == Some(record.id.to_string().as_str()) {
            let _: () = conn
                .del(self.active_key(&record.key))
                .await
                .map_err(unavailable)?;
        }
        self.forget(&mut conn, &record).await
    }

    async fn list_expired(
        &self,
        now: OffsetDateTime,
        idle: Duration,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let cutoff = (now - idle).unix_timestamp();
        let mut conn = self.connection.lock().await;
        let ids: Vec<String> = conn
            .zrangebyscore(self.activity_key(), "-inf", cutoff)
            .await
            .map_err(unavailable)?;
        let mut out = Vec::with_capacity(ids.len());
        for raw in ids {
            if let Ok(id) = Uuid::parse_str(&raw) {
                if let Some(record) = self.load(&mut conn, id).await? {
                    if record.status.is_active() {
                        out.push(record);
                    }
                }
            }
        }
        Ok(out)
    }

    async fn remove_closed(&self, _before: OffsetDateTime) -> Result<usize, StoreError> {
        // Closed sessions were already dropped in `close`.
        Ok(0)
    }

    async fn delete_for_instance(&self, instance: &str) -> Result<usize, StoreError> {
        let mut conn = self.connection.lock().await;
        let ids: Vec<String> = conn
            .smembers(self.instance_key(instance))
            .await
            .map_err(unavailable)?;
        let mut removed = 0usize;
        for raw in &ids {
            if let Ok(id) = Uuid::parse_str(raw) {
                if let Some(record) = self.load(&mut conn, id).await? {
                    let _: () = conn
                        .del(self.active_key(&record.key))
                        .await
                        .map_err(unavailable)?;
                    self.forget(&mut conn, &record).await?;
                    removed += 1;
                }
            }
        }
        let _: () = conn
            .del(self.instance_key(instance))
            .await
            .map_err(unavailable)?;
        Ok(removed)
    }
}
