// Durable "already fired" records keyed by (event, action)
//
// The Redis store claims a record with SET NX EX, so two scheduler replicas
// racing on the same tick cannot both fire the same action.

use crate::errors::StoreError;
use crate::models::ActionKind;
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Redis key of a fired record
pub fn fired_key(event_id: &str, kind: ActionKind) -> String {
    format!("fired:{}:{}", event_id, kind)
}

/// FiredStore persists which actions already fired for which events
#[async_trait]
pub trait FiredStore: Send + Sync {
    /// Whether the action was already recorded as fired
    async fn has_fired(&self, event_id: &str, kind: ActionKind) -> Result<bool, StoreError>;

    /// Record the action as fired, unconditionally
    async fn mark_fired(&self, event_id: &str, kind: ActionKind) -> Result<(), StoreError>;

    /// Atomic check-and-set: record the action as fired and return true,
    /// or return false if it was already recorded
    async fn try_mark_fired(&self, event_id: &str, kind: ActionKind) -> Result<bool, StoreError>;

    /// Remove a record, releasing a claim whose delivery failed
    async fn clear(&self, event_id: &str, kind: ActionKind) -> Result<(), StoreError>;
}

/// Redis-backed fired-record store
#[derive(Clone)]
pub struct RedisFiredStore {
    manager: ConnectionManager,
    ttl: Duration,
}

impl RedisFiredStore {
    /// Connect to Redis; records expire after `ttl`
    #[instrument(skip(url))]
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to create Redis client: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to create connection manager: {}", e))
        })?;

        info!(ttl_seconds = ttl.as_secs(), "Redis fired-record store connected");
        Ok(Self { manager, ttl })
    }

    /// Health check - verify Redis answers PING
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::RedisError(format!("Health check failed: {}", e)))?;

        if response != "PONG" {
            return Err(StoreError::RedisError(format!(
                "Unexpected PING response: {}",
                response
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FiredStore for RedisFiredStore {
    async fn has_fired(&self, event_id: &str, kind: ActionKind) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let exists: bool = conn.exists(fired_key(event_id, kind)).await?;
        Ok(exists)
    }

    async fn mark_fired(&self, event_id: &str, kind: ActionKind) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(fired_key(event_id, kind))
            .arg(Utc::now().to_rfc3339())
            .arg("EX")
            .arg(self.ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(event_id = %event_id, action = %kind))]
    async fn try_mark_fired(&self, event_id: &str, kind: ActionKind) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();

        // SET NX EX sets the key only if absent, atomically with its expiry
        let result: Option<String> = redis::cmd("SET")
            .arg(fired_key(event_id, kind))
            .arg(Utc::now().to_rfc3339())
            .arg("NX")
            .arg("EX")
            .arg(self.ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        let claimed = result.is_some();
        debug!(claimed, "Fired record claim attempted");
        Ok(claimed)
    }

    async fn clear(&self, event_id: &str, kind: ActionKind) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(fired_key(event_id, kind))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// Process-local store for dry runs and tests. Records never expire.
#[derive(Default)]
pub struct InMemoryFiredStore {
    fired: Mutex<HashSet<String>>,
}

impl InMemoryFiredStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.fired.lock().await.len()
    }
}

#[async_trait]
impl FiredStore for InMemoryFiredStore {
    async fn has_fired(&self, event_id: &str, kind: ActionKind) -> Result<bool, StoreError> {
        Ok(self.fired.lock().await.contains(&fired_key(event_id, kind)))
    }

    async fn mark_fired(&self, event_id: &str, kind: ActionKind) -> Result<(), StoreError> {
        self.fired.lock().await.insert(fired_key(event_id, kind));
        Ok(())
    }

    async fn try_mark_fired(&self, event_id: &str, kind: ActionKind) -> Result<bool, StoreError> {
        Ok(self.fired.lock().await.insert(fired_key(event_id, kind)))
    }

    async fn clear(&self, event_id: &str, kind: ActionKind) -> Result<(), StoreError> {
        self.fired.lock().await.remove(&fired_key(event_id, kind));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fired_key_format() {
        assert_eq!(fired_key("evt-1", ActionKind::Poll), "fired:evt-1:poll");
        assert_eq!(
            fired_key("evt-1", ActionKind::Notification),
            "fired:evt-1:notification"
        );
    }

    #[tokio::test]
    async fn test_in_memory_claim_is_exclusive() {
        let store = InMemoryFiredStore::new();
        assert!(!store.has_fired("evt-1", ActionKind::Poll).await.unwrap());
        assert!(store.try_mark_fired("evt-1", ActionKind::Poll).await.unwrap());
        assert!(!store.try_mark_fired("evt-1", ActionKind::Poll).await.unwrap());
        assert!(store.has_fired("evt-1", ActionKind::Poll).await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_actions_are_independent() {
        let store = InMemoryFiredStore::new();
        store.mark_fired("evt-1", ActionKind::Poll).await.unwrap();
        assert!(!store.has_fired("evt-1", ActionKind::Notification).await.unwrap());
        assert!(store
            .try_mark_fired("evt-1", ActionKind::Notification)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_clear_releases_claim() {
        let store = InMemoryFiredStore::new();
        assert!(store.try_mark_fired("evt-2", ActionKind::Poll).await.unwrap());
        store.clear("evt-2", ActionKind::Poll).await.unwrap();
        assert!(!store.has_fired("evt-2", ActionKind::Poll).await.unwrap());
        assert!(store.try_mark_fired("evt-2", ActionKind::Poll).await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_concurrent_claims_yield_one_winner() {
        let store = Arc::new(InMemoryFiredStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_mark_fired("evt-3", ActionKind::Notification).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_redis_invalid_url() {
        let result = RedisFiredStore::connect("not-a-redis-url", Duration::from_secs(60)).await;
        assert!(matches!(result, Err(StoreError::ConnectionFailed(_))));
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_redis_claim_is_exclusive() {
        let store = RedisFiredStore::connect("redis://localhost:6379", Duration::from_secs(60))
            .await
            .unwrap();
        store.health_check().await.unwrap();
        store.clear("redis-evt", ActionKind::Poll).await.unwrap();

        assert!(store.try_mark_fired("redis-evt", ActionKind::Poll).await.unwrap());
        assert!(!store.try_mark_fired("redis-evt", ActionKind::Poll).await.unwrap());
        assert!(store.has_fired("redis-evt", ActionKind::Poll).await.unwrap());

        store.clear("redis-evt", ActionKind::Poll).await.unwrap();
        assert!(!store.has_fired("redis-evt", ActionKind::Poll).await.unwrap());
    }
}
