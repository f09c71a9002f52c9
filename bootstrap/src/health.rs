//! 健康检查
//!
//! 汇总缓存后端、Redis 连接与全部连接池的状态。缓存不可用只影响命中率，
//! 但仍计入整体健康状态，由调用方决定是否对外暴露为未就绪。

use std::time::Duration;

use dlmp_adapter_postgres::HealthChecker as PostgresHealthChecker;
use dlmp_adapter_redis::HealthChecker as RedisHealthChecker;
use dlmp_telemetry::HealthStatus;
use tracing::{debug, warn};

use crate::Infrastructure;

/// 单项检查超时
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

impl Infrastructure {
    /// 执行完整健康检查
    pub async fn health_check(&self) -> HealthStatus {
        self.health_check_with_timeout(HEALTH_CHECK_TIMEOUT).await
    }

    pub async fn health_check_with_timeout(&self, timeout: Duration) -> HealthStatus {
        let mut status = HealthStatus::new();

        let backend = self.cache().registry().store().backend_name();
        let cache_ok = self.cache().ping().await;
        status.add_check(
            "cache",
            cache_ok,
            (!cache_ok).then(|| format!("{} backend did not answer PING", backend)),
        );

        if let Some(redis) = self.redis_backend() {
            match redis.connection() {
                Some(conn) => {
                    let result = RedisHealthChecker::new(conn)
                        .with_timeout(timeout)
                        .check()
                        .await;
                    status.add_check("redis", result.healthy, result.error);
                }
                None => status.add_check(
                    "redis",
                    false,
                    Some("connection not established".to_string()),
                ),
            }
        }

        let router = self.router();
        let results = PostgresHealthChecker::new()
            .with_timeout(timeout)
            .check_registry(router.registry())
            .await;
        for result in results {
            let message = match result.error {
                Some(error) => Some(error),
                None => Some(format!(
                    "{} pool: size={} idle={} active={}",
                    result.role.as_str(),
                    result.pool_status.size,
                    result.pool_status.idle,
                    result.pool_status.active
                )),
            };
            status.add_check(format!("postgres:{}", result.name), result.healthy, message);
        }

        if status.healthy {
            debug!(checks = status.checks.len(), "Health check passed");
        } else {
            warn!(
                failed = status.checks.iter().filter(|c| !c.healthy).count(),
                "Health check failed"
            );
        }

        status
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dlmp_cache::{
        CacheManager, CacheRegistry, CacheStore, MemoryCache, RegionPolicyTable,
    };
    use dlmp_adapter_redis::{LazyRedisCache, RedisConfig};
    use dlmp_config::AppConfig;
    use dlmp_routing::{DataSourceRouter, PoolRegistry};
    use figment::Jail;
    use sqlx::postgres::PgPoolOptions;

    use super::*;

    fn test_config() -> AppConfig {
        let mut config = None;
        Jail::expect_with(|jail| {
            jail.create_file(
                "default.toml",
                r#"
                app_name = "dlmp"
                app_env = "test"

                [database]
                url = "postgres://nobody@127.0.0.1:1/none"

                [redis]
                backend = "memory"
                "#,
            )?;
            config = Some(AppConfig::figment(".", "test").extract()?);
            Ok(())
        });
        config.unwrap()
    }

    fn infrastructure_without_database() -> Infrastructure {
        let store = CacheStore::new(Arc::new(MemoryCache::new()));
        let registry =
            CacheRegistry::from_policies(store, &RegionPolicyTable::defaults()).unwrap();
        let cache = CacheManager::from_registry(registry).unwrap();

        let primary = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();
        let replica = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();
        let pools = PoolRegistry::builder()
            .primary(primary)
            .replica("replica-1", replica)
            .build()
            .unwrap();

        Infrastructure::from_parts(test_config(), cache, DataSourceRouter::new(pools), None)
    }

    #[tokio::test]
    async fn test_health_check_reports_every_pool() {
        let infra = infrastructure_without_database();
        let status = infra
            .health_check_with_timeout(Duration::from_secs(2))
            .await;

        assert!(!status.healthy);
        assert!(status.check("cache").unwrap().healthy);
        assert!(status.check("redis").is_none());

        let primary = status.check("postgres:primary").unwrap();
        assert!(!primary.healthy);
        assert!(primary.message.is_some());
        assert!(status.check("postgres:replica-1").is_some());
    }

    #[tokio::test]
    async fn test_health_check_reports_disconnected_redis() {
        let redis = Arc::new(LazyRedisCache::new(RedisConfig::new("redis://127.0.0.1:1")));
        let store = CacheStore::new(redis.clone());
        let registry =
            CacheRegistry::from_policies(store, &RegionPolicyTable::defaults()).unwrap();
        let cache = CacheManager::from_registry(registry).unwrap();

        let primary = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();
        let pools = PoolRegistry::builder().primary(primary).build().unwrap();
        let infra =
            Infrastructure::from_parts(test_config(), cache, DataSourceRouter::new(pools), Some(redis));

        let status = infra
            .health_check_with_timeout(Duration::from_secs(2))
            .await;

        assert!(!status.healthy);
        assert!(!status.check("cache").unwrap().healthy);
        let redis = status.check("redis").unwrap();
        assert!(!redis.healthy);
        assert_eq!(redis.message.as_deref(), Some("connection not established"));
        assert!(infra.redis_connection().is_none());
    }
}
