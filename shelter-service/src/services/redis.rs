use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tokio::sync::OnceCell;

/// Key-value store behind the response cache.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), anyhow::Error>;
    async fn delete(&self, key: &str) -> Result<(), anyhow::Error>;
    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

/// Redis-backed [`CacheBackend`].
///
/// The connection is opened on first use, so the service starts while Redis
/// is down; every call fails until a connect succeeds, and callers treat a
/// failure as a cache miss. Once connected, the manager reconnects on its own.
#[derive(Clone)]
pub struct RedisService {
    client: Client,
    manager: Arc<OnceCell<ConnectionManager>>,
    connect_timeout: Duration,
}

impl RedisService {
    /// Validates the URL without connecting.
    pub fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        let client = Client::open(config.url.clone())
            .map_err(|e| anyhow::anyhow!("Invalid Redis URL: {}", e))?;

        Ok(Self {
            client,
            manager: Arc::new(OnceCell::new()),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        })
    }

    /// Build the service and try one connect, logging instead of failing when
    /// Redis is unreachable.
    pub async fn connect(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let service = Self::new(config)?;

        match service.connection().await {
            Ok(_) => tracing::info!("Successfully connected to Redis"),
            Err(e) => tracing::warn!(
                error = %e,
                "Redis unreachable, continuing without response cache until it comes back"
            ),
        }

        Ok(service)
    }

    pub fn is_connected(&self) -> bool {
        self.manager.initialized()
    }

    async fn connection(&self) -> Result<ConnectionManager, anyhow::Error> {
        let manager = self
            .manager
            .get_or_try_init(|| async move {
                tokio::time::timeout(self.connect_timeout, self.client.get_connection_manager())
                    .await
                    .map_err(|_| anyhow::anyhow!("Redis connect timed out"))?
                    .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {}", e))
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl CacheBackend for RedisService {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.connection().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get cache: {}", e))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), anyhow::Error> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set cache: {}", e))
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.connection().await?;
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete cache key: {}", e))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// Process-local backend honouring TTLs, for tests and single-node runs.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("In-memory cache mutex poisoned: {}", e))?;

        match entries.get(key) {
            Some((_, expires)) if *expires <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), anyhow::Error> {
        let expires = Instant::now() + Duration::from_secs(ttl_seconds);
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("In-memory cache mutex poisoned: {}", e))?
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("In-memory cache mutex poisoned: {}", e))?
            .remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;
    use crate::services::ResponseCache;

    fn unreachable() -> RedisConfig {
        RedisConfig {
            // Nothing listens on the discard port.
            url: "redis://127.0.0.1:9/".to_string(),
            connect_timeout_ms: 200,
        }
    }

    #[test]
    fn test_bad_url_is_rejected() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            connect_timeout_ms: 200,
        };
        assert!(RedisService::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_starts_without_redis_and_misses() {
        let redis = RedisService::connect(&unreachable()).await.unwrap();
        assert!(!redis.is_connected());
        assert!(redis.health_check().await.is_err());

        let cache = ResponseCache::new("roles", Arc::new(redis), 60);
        let key = cache.key_for_all("roles", &Vec::<String>::new()).unwrap();
        cache.set(&key, &vec!["keeper".to_string()]).await;
        assert!(cache.get::<Vec<String>>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_in_memory_entries_expire() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", 0).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", "v", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        cache.delete("k").await.unwrap();
        assert!(cache.is_empty());
    }
}
