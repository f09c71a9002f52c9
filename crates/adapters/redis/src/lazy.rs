//! 延迟建连的 Redis 缓存
//!
//! 启动时 Redis 不可达不阻塞服务：连接建立之前所有命令返回
//! `ExternalService` 错误，由上层缓存按不可用处理。连接由调用方
//! 通过 `try_connect` 建立（单次尝试），建立后不再替换。

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dlmp_errors::{AppError, AppResult};
use dlmp_ports::CachePort;
use tokio::sync::OnceCell;
use tracing::info;

use crate::cache::RedisCache;
use crate::config::RedisConfig;
use crate::connection::{RedisConnection, connect};

/// 延迟建连的 Redis 缓存
pub struct LazyRedisCache {
    config: RedisConfig,
    cache: OnceCell<(RedisConnection, RedisCache)>,
}

impl LazyRedisCache {
    pub fn new(config: RedisConfig) -> Self {
        Self {
            config,
            cache: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.cache.initialized()
    }

    /// 已建立的连接
    pub fn connection(&self) -> Option<RedisConnection> {
        self.cache.get().map(|(conn, _)| conn.clone())
    }

    /// 尝试建立连接（单次），已连接时直接返回
    ///
    /// URL 非法等配置错误原样返回，调用方不应重试。
    pub async fn try_connect(&self) -> AppResult<()> {
        self.cache
            .get_or_try_init(|| async {
                let conn = connect(&self.config).await?;
                let cache =
                    RedisCache::new(conn.clone()).with_key_prefix(self.config.key_prefix.clone());
                info!(mode = ?self.config.mode, "Redis cache backend connected");
                Ok::<_, AppError>((conn, cache))
            })
            .await?;
        Ok(())
    }

    fn connected(&self) -> AppResult<&RedisCache> {
        self.cache
            .get()
            .map(|(_, cache)| cache)
            .ok_or_else(|| AppError::external_service("Redis connection not established"))
    }
}

impl std::fmt::Debug for LazyRedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyRedisCache")
            .field("mode", &self.config.mode)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl CachePort for LazyRedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.connected()?.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        self.connected()?.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        self.connected()?.delete(key).await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.connected()?.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        self.connected()?.expire(key, ttl).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> AppResult<i64> {
        self.connected()?.incr_by(key, delta).await
    }

    async fn decr_by(&self, key: &str, delta: i64) -> AppResult<i64> {
        self.connected()?.decr_by(key, delta).await
    }

    async fn ttl(&self, key: &str) -> AppResult<Option<Duration>> {
        self.connected()?.ttl(key).await
    }

    async fn delete_by_pattern(&self, pattern: &str) -> AppResult<u64> {
        self.connected()?.delete_by_pattern(pattern).await
    }

    async fn ping(&self) -> AppResult<()> {
        self.connected()?.ping().await
    }

    async fn info(&self) -> AppResult<BTreeMap<String, String>> {
        self.connected()?.info().await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable() -> LazyRedisCache {
        LazyRedisCache::new(
            RedisConfig::new("redis://127.0.0.1:1")
                .with_connection_timeout(Duration::from_millis(300)),
        )
    }

    #[tokio::test]
    async fn test_commands_fail_before_connect() {
        let cache = unreachable();
        assert!(!cache.is_connected());
        assert!(cache.connection().is_none());

        let err = cache.get("user:1").await.unwrap_err();
        assert!(err.is_transient());
        assert!(cache.incr_by("ratelimit:k", 1).await.unwrap_err().is_transient());
        assert!(cache.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_connect_stays_disconnected() {
        let cache = unreachable();
        let err = cache.try_connect().await.unwrap_err();
        assert!(!err.is_configuration());
        assert!(!cache.is_connected());
    }

    #[tokio::test]
    async fn test_invalid_url_is_configuration_error() {
        let cache = LazyRedisCache::new(RedisConfig::new("not-a-redis-url"));
        assert!(cache.try_connect().await.unwrap_err().is_configuration());
    }

    #[tokio::test]
    #[ignore] // 需要 Redis 实例
    async fn test_connects_once() {
        let cache = LazyRedisCache::new(RedisConfig::new("redis://127.0.0.1:6379"));
        cache.try_connect().await.unwrap();
        cache.try_connect().await.unwrap();
        assert!(cache.is_connected());
        cache.ping().await.unwrap();
    }
}
