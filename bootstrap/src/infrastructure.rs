//! 基础设施资源管理
//!
//! 启动顺序：缓存后端 → 区域策略表 → 区域注册表与门面 → 限流规则 →
//! 连接池 → 数据源路由器 → 路由校验。任何配置错误都会使启动失败；
//! Redis 暂不可达时以降级模式启动，并在后台重连。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dlmp_adapter_postgres::{PostgresConfig, create_pool};
use dlmp_adapter_redis::{LazyRedisCache, RedisConnection};
use dlmp_cache::{
    CacheManager, CacheRegistry, CacheStore, MemoryCache, RateLimitRule, RegionPolicyTable,
};
use dlmp_config::{AppConfig, CacheBackendKind, CacheConfig, RateLimitRuleConfig};
use dlmp_errors::{AppError, AppResult};
use dlmp_ports::CachePort;
use dlmp_routing::{DataSourceRouter, PRIMARY, PoolRegistry, REPLICA};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::retry::{RetryConfig, with_retry, with_retry_if, with_retry_optional};

/// 调用方会使用的路由名，启动时全部校验
pub const REQUIRED_ROUTES: &[&str] = &[PRIMARY, REPLICA];

/// 基础设施资源容器
pub struct Infrastructure {
    /// 应用配置
    config: AppConfig,
    /// 缓存管理器
    cache: CacheManager,
    /// 数据源路由器
    router: Arc<DataSourceRouter<PgPool>>,
    /// Redis 后端（内存后端时为 None）
    redis: Option<Arc<LazyRedisCache>>,
    /// 后台重连任务
    reconnect_task: Option<JoinHandle<()>>,
}

/// 已装配的缓存层
pub struct CacheSetup {
    pub cache: CacheManager,
    pub redis: Option<Arc<LazyRedisCache>>,
    pub reconnect_task: Option<JoinHandle<()>>,
}

impl Infrastructure {
    /// 从配置创建基础设施资源（带重试）
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        Self::from_config_with_retry(config, RetryConfig::default()).await
    }

    pub async fn from_config_with_retry(config: AppConfig, retry: RetryConfig) -> AppResult<Self> {
        // 1-3. 缓存后端、区域策略与门面、限流规则
        let CacheSetup {
            cache,
            redis,
            reconnect_task,
        } = build_cache(&config, &retry).await?;

        // 4. 连接池与路由
        let router = match create_router(&config, &retry).await {
            Ok(router) => router,
            Err(e) => {
                abort_task(reconnect_task);
                return Err(e);
            }
        };

        info!(
            app = %config.app_name,
            env = %config.app_env,
            cache_backend = cache.registry().store().backend_name(),
            pools = router.describe().len(),
            "Infrastructure initialized"
        );

        Ok(Self {
            config,
            cache,
            router: Arc::new(router),
            redis,
            reconnect_task,
        })
    }

    /// 由已装配的组件直接构建（嵌入与测试场景）
    pub fn from_parts(
        config: AppConfig,
        cache: CacheManager,
        router: DataSourceRouter<PgPool>,
        redis: Option<Arc<LazyRedisCache>>,
    ) -> Self {
        Self {
            config,
            cache,
            router: Arc::new(router),
            redis,
            reconnect_task: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn router(&self) -> Arc<DataSourceRouter<PgPool>> {
        self.router.clone()
    }

    pub fn redis_backend(&self) -> Option<&Arc<LazyRedisCache>> {
        self.redis.as_ref()
    }

    /// 已建立的 Redis 连接
    pub fn redis_connection(&self) -> Option<RedisConnection> {
        self.redis.as_ref().and_then(|redis| redis.connection())
    }
}

impl Drop for Infrastructure {
    fn drop(&mut self) {
        abort_task(self.reconnect_task.take());
    }
}

/// 按配置装配缓存层：后端、区域注册表、门面与限流规则
pub async fn build_cache(config: &AppConfig, retry: &RetryConfig) -> AppResult<CacheSetup> {
    let (port, redis, reconnect_task) = create_cache_backend(config, retry).await?;
    let store = CacheStore::new(port).with_command_timeout(config.redis.command_timeout());

    match cache_manager(config, store) {
        Ok(cache) => Ok(CacheSetup {
            cache,
            redis,
            reconnect_task,
        }),
        Err(e) => {
            abort_task(reconnect_task);
            Err(e)
        }
    }
}

fn cache_manager(config: &AppConfig, store: CacheStore) -> AppResult<CacheManager> {
    let table = policy_table(&config.cache)?;
    let registry = CacheRegistry::from_policies(store, &table)?;
    let cache = CacheManager::from_registry(registry)?;

    let rules = rate_limit_rules(&config.rate_limit)?;
    let limiter = cache.rate_limiter().clone().with_rules(rules);
    Ok(cache.with_rate_limiter(limiter))
}

fn abort_task(task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        task.abort();
    }
}

/// 创建缓存后端
///
/// Redis 重试耗尽后以未连接状态返回，命令按不可用处理，后台任务持续重连。
/// URL 非法等配置错误不重试，直接使启动失败。
async fn create_cache_backend(
    config: &AppConfig,
    retry: &RetryConfig,
) -> AppResult<(
    Arc<dyn CachePort>,
    Option<Arc<LazyRedisCache>>,
    Option<JoinHandle<()>>,
)> {
    match config.redis.backend {
        CacheBackendKind::Memory => {
            if config.is_production() {
                warn!("In-process cache backend is used in production");
            }
            info!("Using in-process cache backend");
            let port: Arc<dyn CachePort> = Arc::new(MemoryCache::new());
            Ok((port, None, None))
        }
        CacheBackendKind::Redis => {
            let redis = Arc::new(LazyRedisCache::new(redis_adapter_config(&config.redis)));
            let connected = with_retry_if(
                retry,
                "Redis connection",
                || redis.try_connect(),
                |e: &AppError| !e.is_configuration(),
            )
            .await;

            let reconnect_task = match connected {
                Ok(()) => None,
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Redis unavailable, starting with cache degraded");
                    Some(spawn_redis_reconnect(redis.clone(), retry))
                }
            };

            let port: Arc<dyn CachePort> = redis.clone();
            Ok((port, Some(redis), reconnect_task))
        }
    }
}

/// 后台重连 Redis，直到连接建立
fn spawn_redis_reconnect(redis: Arc<LazyRedisCache>, retry: &RetryConfig) -> JoinHandle<()> {
    let retry = RetryConfig {
        max_attempts: u32::MAX,
        ..retry.clone()
    };
    tokio::spawn(async move {
        if with_retry_optional(&retry, "Redis reconnect", || redis.try_connect())
            .await
            .is_some()
        {
            info!("Redis reconnected, cache leaves degraded mode");
        }
    })
}

/// 启动时必须可解析的路由：主库、副本组与每个已配置副本
pub fn configured_routes(config: &AppConfig) -> Vec<&str> {
    REQUIRED_ROUTES
        .iter()
        .copied()
        .chain(config.database.replicas.iter().map(|r| r.name.as_str()))
        .collect()
}

/// 配置 → Redis 适配器配置
pub fn redis_adapter_config(config: &dlmp_config::RedisConfig) -> dlmp_adapter_redis::RedisConfig {
    let adapter = dlmp_adapter_redis::RedisConfig::new(config.url.expose_secret().clone())
        .with_key_prefix(config.key_prefix.clone())
        .with_connection_timeout(config.connect_timeout());

    match config.mode {
        dlmp_config::RedisMode::Standalone => adapter,
        dlmp_config::RedisMode::Cluster => adapter.with_cluster(config.cluster_nodes.clone()),
    }
}

/// 默认区域策略叠加配置覆盖，并校验 TTL 顺序
pub fn policy_table(config: &CacheConfig) -> AppResult<RegionPolicyTable> {
    let mut table = RegionPolicyTable::defaults();

    for (region, region_override) in &config.regions {
        if region_override.non_expiring {
            table.override_ttl(region, None)?;
        } else if let Some(secs) = region_override.ttl_secs {
            table.override_ttl(region, Some(Duration::from_secs(secs)))?;
        }
        table.override_cache_nulls(region, region_override.cache_nulls)?;
    }

    table.validate()?;
    Ok(table)
}

/// 配置 → 命名限流规则
pub fn rate_limit_rules(
    config: &BTreeMap<String, RateLimitRuleConfig>,
) -> AppResult<Vec<(String, RateLimitRule)>> {
    config
        .iter()
        .map(|(name, rule)| {
            RateLimitRule::new(rule.max_requests, Duration::from_secs(rule.window_secs))
                .map(|rule| (name.clone(), rule))
                .map_err(|e| AppError::configuration(format!("rate limit rule '{}': {}", name, e)))
        })
        .collect()
}

/// 创建连接池与路由器，并校验全部已配置路由
async fn create_router(
    config: &AppConfig,
    retry: &RetryConfig,
) -> AppResult<DataSourceRouter<PgPool>> {
    let pools = create_pool_registry(config, retry).await?;
    let router = DataSourceRouter::new(pools);
    router.validate_routes(configured_routes(config))?;
    Ok(router)
}

/// 创建主库与副本连接池并注册
///
/// 主库不可用时启动失败；副本重试耗尽后跳过，随后的路由校验会拒绝启动。
async fn create_pool_registry(
    config: &AppConfig,
    retry: &RetryConfig,
) -> AppResult<PoolRegistry<PgPool>> {
    let database = &config.database;

    let primary_config = PostgresConfig::new(database.url.expose_secret().clone())
        .with_max_connections(database.max_connections)
        .with_acquire_timeout(database.acquire_timeout())
        .with_application_name(config.app_name.clone());
    let primary = with_retry(retry, "PostgreSQL primary connection", || {
        create_pool(&primary_config)
    })
    .await?;

    let mut builder = PoolRegistry::builder().primary(primary);

    for replica in &database.replicas {
        let replica_config = PostgresConfig::new(replica.url.expose_secret().clone())
            .with_max_connections(replica.max_connections)
            .with_acquire_timeout(database.acquire_timeout())
            .with_application_name(config.app_name.clone());

        let operation = format!("PostgreSQL replica '{}' connection", replica.name);
        match with_retry_optional(retry, &operation, || create_pool(&replica_config)).await {
            Some(pool) => builder = builder.replica(replica.name.clone(), pool),
            None => warn!(replica = %replica.name, "Replica skipped"),
        }
    }

    builder.build()
}
