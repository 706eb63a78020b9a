use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::metrics::{record_cache_hit, record_cache_miss, track_cache_operation};
use crate::models::QuizSessionState;

/// Per-visitor storage for the serialized quiz session state.
///
/// Reads return the last-written blob or nothing; writes are last-write-wins
/// for the lifetime of the visitor's session (or the TTL). Concurrent
/// requests from the same browser can therefore clobber each other — an
/// accepted limitation of the delivery model, not something this layer
/// papers over.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, visitor_id: &str) -> Result<Option<QuizSessionState>>;

    async fn save(&self, visitor_id: &str, state: &QuizSessionState) -> Result<()>;

    async fn clear(&self, visitor_id: &str) -> Result<()>;

    async fn healthy(&self) -> Result<()>;
}

pub struct RedisSessionStore {
    redis: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(redis: ConnectionManager, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }

    fn state_key(visitor_id: &str) -> String {
        format!("quiz_state:{}", visitor_id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, visitor_id: &str) -> Result<Option<QuizSessionState>> {
        // Clone connection for this operation
        let mut conn = self.redis.clone();
        let key = Self::state_key(visitor_id);

        let raw: Option<String> = track_cache_operation("get", async {
            redis::cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .context("Failed to load quiz state from Redis")
        })
        .await?;

        match raw {
            Some(json) => {
                record_cache_hit();
                let state: QuizSessionState = serde_json::from_str(&json)
                    .context("Failed to deserialize quiz session state")?;
                Ok(Some(state))
            }
            None => {
                record_cache_miss();
                Ok(None)
            }
        }
    }

    async fn save(&self, visitor_id: &str, state: &QuizSessionState) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = Self::state_key(visitor_id);
        let json =
            serde_json::to_string(state).context("Failed to serialize quiz session state")?;

        track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(&key)
                .arg(self.ttl_seconds)
                .arg(json)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to save quiz state to Redis")
        })
        .await
    }

    async fn clear(&self, visitor_id: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = Self::state_key(visitor_id);

        track_cache_operation("del", async {
            redis::cmd("DEL")
                .arg(&key)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to clear quiz state from Redis")
        })
        .await
    }

    async fn healthy(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_millis(500),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 500ms"))?
        .context("Redis PING failed")?;
        Ok(())
    }
}

/// In-memory session store for tests and local prototyping.
#[derive(Default)]
pub struct InMemorySessionStore {
    states: Mutex<HashMap<String, QuizSessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, visitor_id: &str) -> Result<Option<QuizSessionState>> {
        Ok(self
            .states
            .lock()
            .expect("session store lock poisoned")
            .get(visitor_id)
            .cloned())
    }

    async fn save(&self, visitor_id: &str, state: &QuizSessionState) -> Result<()> {
        self.states
            .lock()
            .expect("session store lock poisoned")
            .insert(visitor_id.to_string(), state.clone());
        Ok(())
    }

    async fn clear(&self, visitor_id: &str) -> Result<()> {
        self.states
            .lock()
            .expect("session store lock poisoned")
            .remove(visitor_id);
        Ok(())
    }

    async fn healthy(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_returns_last_written_state() {
        let store = InMemorySessionStore::new();
        assert!(store.load("visitor").await.unwrap().is_none());

        let mut state = QuizSessionState::default();
        state.start_once("run", "item", chrono::Utc::now());
        store.save("visitor", &state).await.unwrap();

        let loaded = store.load("visitor").await.unwrap().unwrap();
        assert!(loaded.buffer("run", "item").is_some());

        store.clear("visitor").await.unwrap();
        assert!(store.load("visitor").await.unwrap().is_none());
    }
}
