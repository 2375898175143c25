//! Cache-aside storage for user lookups.
//!
//! Entries are JSON snapshots of [`User`] stored under `user-{id}` with a
//! fixed TTL. Nothing invalidates an entry early: a role or activation
//! change becomes visible once the entry expires.

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CoreResult;
use crate::model::User;

pub use self::memory::MemoryUserCache;
pub use self::redis::RedisUserCache;

#[async_trait]
pub trait UserCache: Send + Sync {
    /// `Ok(None)` on a miss.
    async fn get(&self, user_id: i64) -> CoreResult<Option<User>>;
    async fn set(&self, user: &User) -> CoreResult<()>;
}

/// Cache used when caching is disabled. Always misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl UserCache for NoopCache {
    async fn get(&self, _user_id: i64) -> CoreResult<Option<User>> {
        Ok(None)
    }

    async fn set(&self, _user: &User) -> CoreResult<()> {
        Ok(())
    }
}

pub fn user_key(user_id: i64) -> String {
    format!("user-{user_id}")
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Empty selects the in-process cache.
    #[serde(default)]
    pub redis_url: String,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: String::new(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

fn default_ttl_seconds() -> u64 {
    60
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Builds the cache selected by `config`.
pub async fn from_config(config: &CacheConfig) -> CoreResult<Arc<dyn UserCache>> {
    if !config.enabled {
        tracing::info!("user cache disabled");
        return Ok(Arc::new(NoopCache));
    }
    if config.redis_url.is_empty() {
        tracing::info!(ttl_secs = config.ttl_seconds, "using in-process user cache");
        return Ok(Arc::new(MemoryUserCache::new(config.ttl())));
    }
    let cache = RedisUserCache::connect(&config.redis_url, config.ttl()).await?;
    tracing::info!(ttl_secs = config.ttl_seconds, "using redis user cache");
    Ok(Arc::new(cache))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        assert_eq!(user_key(42), "user-42");
    }

    #[tokio::test]
    async fn noop_cache_always_misses() {
        let cache = NoopCache;
        assert!(cache.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_config_builds_noop_cache() {
        let cache = from_config(&CacheConfig::default()).await.unwrap();
        assert!(cache.get(1).await.unwrap().is_none());
    }

    #[test]
    fn default_ttl_is_one_minute() {
        assert_eq!(CacheConfig::default().ttl(), Duration::from_secs(60));
    }
}
