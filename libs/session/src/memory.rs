use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{SessionKey, SessionRecord, SessionStatus, SessionStore, StoreError};

/// In-memory store used in tests and single-process deployments.
#[derive(Default)]
pub struct MemorySessionStore {
    by_id: DashMap<Uuid, SessionRecord>,
    active: DashMap<String, Uuid>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<F>(&self, id: Uuid, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut SessionRecord),
    {
        match self.by_id.get_mut(&id) {
            Some(mut entry) => {
                apply(entry.value_mut());
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
        let id = match self.active.get(&key.cache_key()) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        Ok(self.by_id.get(&id).map(|entry| entry.value().clone()))
    }

    async fn create(
        &self,
        key: &SessionKey,
        external_ref: &str,
    ) -> Result<SessionRecord, StoreError> {
        // The entry API locks the shard, making the conflict check atomic
        // against concurrent creates for the same key.
        match self.active.entry(key.cache_key()) {
            Entry::Occupied(occupied) => {
                let id = *occupied.get();
                let existing = self
                    .by_id
                    .get(&id)
                    .map(|entry| entry.value().clone())
                    .ok_or(StoreError::NotFound(id))?;
                Err(StoreError::Conflict { existing })
            }
            Entry::Vacant(vacant) => {
                let record = SessionRecord::new(key.clone(), external_ref);
                self.by_id.insert(record.id, record.clone());
                vacant.insert(record.id);
                Ok(record)
            }
        }
    }

    async fn touch(&self, id: Uuid) -> Result<(), StoreError> {
        self.mutate(id, |record| {
            record.last_activity_at = OffsetDateTime::now_utc();
        })
    }

    async fn set_awaiting(&self, id: Uuid, awaiting: bool) -> Result<(), StoreError> {
        self.mutate(id, |record| {
            record.awaiting_input = awaiting;
        })
    }

    async fn close(&self, id: Uuid) -> Result<(), StoreError> {
        let cache_key = {
            let mut entry = self.by_id.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            let record = entry.value_mut();
            record.status = SessionStatus::Closed;
            record.awaiting_input = false;
            record.last_activity_at = OffsetDateTime::now_utc();
            record.key.cache_key()
        };
        // Free the key only if it still points at this session.
        self.active.remove_if(&cache_key, |_, active| *active == id);
        Ok(())
    }

    async fn list_expired(
        &self,
        now: OffsetDateTime,
        idle: Duration,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self
            .by_id
            .iter()
            .filter(|entry| {
                entry.status.is_active() && now - entry.last_activity_at > idle
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn remove_closed(&self, before: OffsetDateTime) -> Result<usize, StoreError> {
        let stale: Vec<Uuid> = self
            .by_id
            .iter()
            .filter(|entry| {
                entry.status == SessionStatus::Closed && entry.last_activity_at < before
            })
            .map(|entry| entry.id)
            .collect();
        for id in &stale {
            self.by_id.remove(id);
        }
        Ok(stale.len())
    }

    async fn delete_for_instance(&self, instance: &str) -> Result<usize, StoreError> {
        let doomed: Vec<SessionRecord> = self
            .by_id
            .iter()
            .filter(|entry| entry.key.instance == instance)
            .map(|entry| entry.value().clone())
            .collect();
        for record in &doomed {
            self.by_id.remove(&record.id);
            self.active
                .remove_if(&record.key.cache_key(), |_, active| *active == record.id);
        }
        Ok(doomed.len())
    }
}
