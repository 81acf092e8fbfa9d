use crate::domain::session::SessionRecord;
use crate::error::{AppError, Result};
use crate::services::session_store::SessionStore;
use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::Arc;
use time::OffsetDateTime;

/// Process-local session store keyed by user name.
///
/// Each user owns at most one map entry, so operations on that user serialize on the
/// entry's shard lock and a second record can never appear.
#[derive(Clone, Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, user_name: &str, token_hash: &str, created_at: OffsetDateTime) -> Result<()> {
        match self.sessions.entry(user_name.to_string()) {
            Entry::Occupied(_) => Err(AppError::DuplicateSession(user_name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(SessionRecord::new(user_name, token_hash, created_at));
                Ok(())
            }
        }
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<u64> {
        let mut removed = 0;
        self.sessions.retain(|_, record| {
            let keep = record.refresh_token_hash != token_hash;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn delete_by_user(&self, user_name: &str) -> Result<u64> {
        Ok(u64::from(self.sessions.remove(user_name).is_some()))
    }

    async fn count(&self, user_name: &str) -> Result<i64> {
        Ok(i64::from(self.sessions.contains_key(user_name)))
    }

    async fn find_hash(&self, user_name: &str) -> Result<Option<String>> {
        Ok(self.sessions.get(user_name).map(|record| record.refresh_token_hash.clone()))
    }

    async fn created_at(&self, token_hash: &str, user_name: &str) -> Result<Option<OffsetDateTime>> {
        Ok(self
            .sessions
            .get(user_name)
            .filter(|record| record.refresh_token_hash == token_hash)
            .map(|record| record.created_at))
    }

    async fn replace(
        &self,
        user_name: &str,
        old_hash: &str,
        new_hash: &str,
        created_at: OffsetDateTime,
    ) -> Result<bool> {
        let Some(mut record) = self.sessions.get_mut(user_name) else {
            return Ok(false);
        };
        if record.refresh_token_hash != old_hash {
            return Ok(false);
        }

        *record = SessionRecord::new(user_name, new_hash, created_at);
        Ok(true)
    }

    async fn establish(&self, user_name: &str, token_hash: &str, created_at: OffsetDateTime) -> Result<u64> {
        let record = SessionRecord::new(user_name, token_hash, created_at);
        Ok(u64::from(self.sessions.insert(user_name.to_string(), record).is_some()))
    }

    async fn delete_created_before(&self, cutoff: OffsetDateTime) -> Result<u64> {
        let mut removed = 0;
        self.sessions.retain(|_, record| {
            let keep = record.created_at >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_find_and_count() {
        let store = InMemorySessionStore::new();
        let now = OffsetDateTime::now_utc();

        assert_eq!(store.count("alice").await.unwrap(), 0);
        assert!(store.find_hash("alice").await.unwrap().is_none());

        store.insert("alice", "h1", now).await.unwrap();

        assert_eq!(store.count("alice").await.unwrap(), 1);
        assert_eq!(store.find_hash("alice").await.unwrap().as_deref(), Some("h1"));
        assert_eq!(store.created_at("h1", "alice").await.unwrap(), Some(now));
        assert!(store.created_at("h1", "bob").await.unwrap().is_none());
        assert!(store.created_at("h2", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_insert_for_user_is_rejected() {
        let store = InMemorySessionStore::new();
        let now = OffsetDateTime::now_utc();
        store.insert("alice", "h1", now).await.unwrap();

        let err = store.insert("alice", "h2", now).await.unwrap_err();

        assert!(matches!(err, AppError::DuplicateSession(ref user) if user == "alice"));
        assert_eq!(store.count("alice").await.unwrap(), 1);
        assert_eq!(store.find_hash("alice").await.unwrap().as_deref(), Some("h1"));
    }

    #[tokio::test]
    async fn test_delete_by_hash_and_user() {
        let store = InMemorySessionStore::new();
        let now = OffsetDateTime::now_utc();
        store.insert("alice", "h1", now).await.unwrap();
        store.insert("bob", "h2", now).await.unwrap();

        assert_eq!(store.delete_by_hash("h1").await.unwrap(), 1);
        assert_eq!(store.delete_by_hash("h1").await.unwrap(), 0);
        assert_eq!(store.count("alice").await.unwrap(), 0);

        assert_eq!(store.delete_by_user("bob").await.unwrap(), 1);
        assert_eq!(store.delete_by_user("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_is_conditional_on_old_hash() {
        let store = InMemorySessionStore::new();
        let now = OffsetDateTime::now_utc();
        store.insert("alice", "old", now).await.unwrap();

        assert!(store.replace("alice", "old", "new", now).await.unwrap());
        assert!(!store.replace("alice", "old", "newer", now).await.unwrap());
        assert!(!store.replace("bob", "new", "newer", now).await.unwrap());

        assert_eq!(store.count("alice").await.unwrap(), 1);
        assert_eq!(store.find_hash("alice").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_establish_purges_previous_record() {
        let store = InMemorySessionStore::new();
        let now = OffsetDateTime::now_utc();
        store.insert("alice", "h1", now).await.unwrap();

        assert_eq!(store.establish("alice", "h2", now).await.unwrap(), 1);
        assert_eq!(store.establish("bob", "h3", now).await.unwrap(), 0);

        assert_eq!(store.count("alice").await.unwrap(), 1);
        assert_eq!(store.find_hash("alice").await.unwrap().as_deref(), Some("h2"));
    }

    #[tokio::test]
    async fn test_delete_created_before() {
        let store = InMemorySessionStore::new();
        let now = OffsetDateTime::now_utc();
        store.insert("stale", "h1", now - time::Duration::days(2)).await.unwrap();
        store.insert("fresh", "h2", now).await.unwrap();

        assert_eq!(store.delete_created_before(now - time::Duration::days(1)).await.unwrap(), 1);
        assert_eq!(store.count("stale").await.unwrap(), 0);
        assert_eq!(store.count("fresh").await.unwrap(), 1);
    }
}
