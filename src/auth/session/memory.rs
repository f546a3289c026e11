//! In-memory session store for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{SessionRecord, SessionStore, StoreError};
use crate::auth::now_unix;

pub struct MemorySessionStore {
    idle_timeout: u64,
    remember_lifetime: u64,
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(idle_timeout: u64, remember_lifetime: u64) -> Self {
        Self {
            idle_timeout,
            remember_lifetime,
            records: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.write()
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let record = self.read().get(session_id).cloned();
        let Some(record) = record else {
            return Ok(None);
        };
        if record.is_expired(now_unix(), self.idle_timeout, self.remember_lifetime) {
            self.write().remove(session_id);
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn touch(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut map = self.write();
        match map.get_mut(session_id) {
            Some(record) => {
                record.last_seen_at_unix = now_unix();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut map = self.write();
        if map.contains_key(&record.session_id) {
            map.insert(record.session_id.clone(), record.clone());
        }
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> Result<(), StoreError> {
        self.write().remove(session_id);
        Ok(())
    }

    async fn destroy_all(&self) -> Result<(), StoreError> {
        self.write().clear();
        Ok(())
    }

    async fn sweep(&self, older_than: u64) -> Result<usize, StoreError> {
        let cutoff = now_unix().saturating_sub(i64::try_from(older_than).unwrap_or(i64::MAX));
        let mut map = self.write();
        let before = map.len();
        map.retain(|_, record| record.last_seen_at_unix > cutoff);
        Ok(before - map.len())
    }
}
