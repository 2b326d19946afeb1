use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{generate_access_token, hash_access_token};
use crate::pages::Pages;

/// One desk session and the state of every page it has open.
#[derive(Debug)]
pub struct Session {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub pages: Pages,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Live sessions keyed by the SHA-256 of their bearer token.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session; returns the plaintext token (shown once) and the session.
    pub async fn open(&self, ttl_hours: i64) -> (String, Arc<Session>) {
        let now = Utc::now();
        let token = generate_access_token();
        let session = Arc::new(Session {
            session_id: Uuid::new_v4(),
            created_at: now,
            expires_at: now + Duration::hours(ttl_hours),
            pages: Pages::default(),
        });

        let mut sessions = self.inner.write().await;
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(hash_access_token(&token), Arc::clone(&session));
        (token, session)
    }

    /// Live session for `token_hash`; an expired one is dropped on sight.
    pub async fn lookup(&self, token_hash: &str) -> Option<Arc<Session>> {
        let now = Utc::now();
        let session = self.inner.read().await.get(token_hash).cloned()?;
        if session.is_expired(now) {
            self.inner.write().await.remove(token_hash);
            return None;
        }
        Some(session)
    }

    pub async fn revoke(&self, token_hash: &str) -> bool {
        self.inner.write().await.remove(token_hash).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_then_lookup_by_hash() {
        let store = SessionStore::new();
        let (token, session) = store.open(24).await;

        let found = store.lookup(&hash_access_token(&token)).await.unwrap();
        assert_eq!(found.session_id, session.session_id);
        assert!(store.lookup(&token).await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_dropped() {
        let store = SessionStore::new();
        let (token, _) = store.open(0).await;

        assert!(store.lookup(&hash_access_token(&token)).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn revoke_removes_session() {
        let store = SessionStore::new();
        let (token, _) = store.open(1).await;
        let hash = hash_access_token(&token);

        assert!(store.revoke(&hash).await);
        assert!(!store.revoke(&hash).await);
        assert!(store.lookup(&hash).await.is_none());
    }
}
