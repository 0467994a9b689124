//! Login sessions.
//!
//! A JWT is only accepted while its `session_id` is live here, which is what
//! makes logout effective before the token expires.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session backend failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Register a session that stays live until `expires_at` or revocation.
    async fn create(&self, session_id: Uuid, expires_at: DateTime<Utc>) -> Result<(), SessionError>;

    async fn is_live(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<bool, SessionError>;

    /// Revoking an unknown or already revoked session is not an error.
    async fn revoke(&self, session_id: Uuid) -> Result<(), SessionError>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> SessionError {
    SessionError::Backend("session lock poisoned".to_string())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session_id: Uuid, expires_at: DateTime<Utc>) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        sessions.insert(session_id, expires_at);
        Ok(())
    }

    async fn is_live(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<bool, SessionError> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        match sessions.get(&session_id) {
            Some(expires_at) if *expires_at > now => Ok(true),
            Some(_) => {
                sessions.remove(&session_id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn revoke(&self, session_id: Uuid) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        sessions.remove(&session_id);
        Ok(())
    }
}

/// Seconds until `expires_at`, at least one (Redis rejects `EX 0`).
#[cfg_attr(not(feature = "redis"), allow(dead_code))]
fn ttl_secs(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let remaining = expires_at - now;
    u64::try_from(remaining.num_seconds()).unwrap_or(0).max(1)
}

#[cfg(feature = "redis")]
pub use redis_store::RedisSessionStore;

#[cfg(feature = "redis")]
mod redis_store {
    use super::*;

    use redis::AsyncCommands;
    use redis::aio::ConnectionManager;

    /// Sessions as `SET spadesk:session:<id> 1 EX <ttl>` keys; expiry is
    /// left to Redis.
    #[derive(Clone)]
    pub struct RedisSessionStore {
        conn: ConnectionManager,
        prefix: String,
    }

    impl core::fmt::Debug for RedisSessionStore {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            f.debug_struct("RedisSessionStore")
                .field("prefix", &self.prefix)
                .finish_non_exhaustive()
        }
    }

    impl RedisSessionStore {
        pub async fn connect(redis_url: &str) -> Result<Self, SessionError> {
            let client =
                redis::Client::open(redis_url).map_err(|e| SessionError::Backend(e.to_string()))?;
            let conn = ConnectionManager::new(client)
                .await
                .map_err(|e| SessionError::Backend(e.to_string()))?;
            Ok(Self {
                conn,
                prefix: "spadesk:session:".to_string(),
            })
        }

        fn key(&self, session_id: Uuid) -> String {
            format!("{}{session_id}", self.prefix)
        }
    }

    #[async_trait]
    impl SessionStore for RedisSessionStore {
        async fn create(
            &self,
            session_id: Uuid,
            expires_at: DateTime<Utc>,
        ) -> Result<(), SessionError> {
            let mut conn = self.conn.clone();
            let ttl = ttl_secs(expires_at, Utc::now());
            conn.set_ex::<_, _, ()>(self.key(session_id), 1u8, ttl)
                .await
                .map_err(|e| SessionError::Backend(e.to_string()))
        }

        async fn is_live(&self, session_id: Uuid, _now: DateTime<Utc>) -> Result<bool, SessionError> {
            let mut conn = self.conn.clone();
            conn.exists::<_, bool>(self.key(session_id))
                .await
                .map_err(|e| SessionError::Backend(e.to_string()))
        }

        async fn revoke(&self, session_id: Uuid) -> Result<(), SessionError> {
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(self.key(session_id))
                .await
                .map_err(|e| SessionError::Backend(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[tokio::test]
    async fn revoked_and_expired_sessions_are_not_live() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());

        store.create(a, now + Duration::hours(1)).await.unwrap();
        store.create(b, now + Duration::seconds(5)).await.unwrap();
        assert!(store.is_live(a, now).await.unwrap());

        store.revoke(a).await.unwrap();
        assert!(!store.is_live(a, now).await.unwrap());
        assert!(!store.is_live(b, now + Duration::seconds(6)).await.unwrap());
        store.revoke(Uuid::now_v7()).await.unwrap();
    }

    #[test]
    fn redis_ttl_is_never_zero() {
        let now = Utc::now();
        assert_eq!(ttl_secs(now, now), 1);
        assert_eq!(ttl_secs(now + Duration::seconds(90), now), 90);
    }
}
