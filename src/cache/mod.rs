// Read-through metadata cache: providers, models, pricing, support edges.
// Misses and backend errors both fall through to storage; writes invalidate.

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn put(&self, key: &str, value: String, ttl: Duration);
    async fn invalidate(&self, key: &str);
}

pub type CacheHandle = Arc<dyn MetadataCache>;

/// In-process TTL cache; the single-node default and the test double.
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Some(value.clone()),
            _ => None,
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));

        // Opportunistic sweep keeps the map from accumulating dead entries.
        if entries.len() > 1024 {
            let now = Instant::now();
            entries.retain(|_, (_, expires)| *expires > now);
        }
    }

    async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

/// Redis-backed cache for multi-node deployments.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn connect(url: &str) -> crate::domain::Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| crate::domain::GatewayError::Cache(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataCache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = match self.client.get_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Redis connection failed, treating as miss: {}", e);
                return None;
            }
        };
        conn.get::<_, Option<String>>(key).await.unwrap_or(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) {
        if let Ok(mut conn) = self.client.get_async_connection().await {
            let result: redis::RedisResult<()> = redis::cmd("SETEX")
                .arg(key)
                .arg(ttl.as_secs().max(1))
                .arg(value)
                .query_async(&mut conn)
                .await;
            if let Err(e) = result {
                warn!("Redis put failed for {}: {}", key, e);
            }
        }
    }

    async fn invalidate(&self, key: &str) {
        if let Ok(mut conn) = self.client.get_async_connection().await {
            let result: redis::RedisResult<()> = conn.del(key).await;
            if let Err(e) = result {
                warn!("Redis invalidate failed for {}: {}", key, e);
            }
        }
    }
}

/// Fetch a typed value through the cache, falling back to `load` on miss.
pub async fn read_through<T, F, Fut>(
    cache: &CacheHandle,
    key: &str,
    ttl: Duration,
    load: F,
) -> crate::domain::Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = crate::domain::Result<T>>,
{
    if let Some(raw) = cache.get(key).await {
        if let Ok(value) = serde_json::from_str(&raw) {
            debug!("cache hit: {}", key);
            return Ok(value);
        }
        // Unparseable entry: drop it and reload.
        cache.invalidate(key).await;
    }

    let value = load().await?;
    if let Ok(raw) = serde_json::to_string(&value) {
        cache.put(key, raw, ttl).await;
    }
    Ok(value)
}
