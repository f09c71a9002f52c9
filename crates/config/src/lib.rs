//! dlmp-config - 配置加载库
//!
//! 加载顺序：`default.toml` → `<APP_ENV>.toml` → `DLMP_` 前缀环境变量（嵌套键以 `__` 分隔）

use std::collections::BTreeMap;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// 缓存后端类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// 远程 Redis
    #[default]
    Redis,
    /// 进程内存（开发、测试环境）
    Memory,
}

/// Redis 部署模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    #[default]
    Standalone,
    Cluster,
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub backend: CacheBackendKind,
    #[serde(default = "default_redis_url")]
    pub url: Secret<String>,
    #[serde(default)]
    pub mode: RedisMode,
    #[serde(default)]
    pub cluster_nodes: Vec<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_redis_url() -> Secret<String> {
    Secret::new("redis://127.0.0.1:6379".to_string())
}

fn default_key_prefix() -> String {
    "dlmp".to_string()
}

fn default_command_timeout_ms() -> u64 {
    3000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl RedisConfig {
    /// 单条命令超时
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// 建立连接超时
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::default(),
            url: default_redis_url(),
            mode: RedisMode::default(),
            cluster_nodes: Vec::new(),
            key_prefix: default_key_prefix(),
            command_timeout_ms: default_command_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// 只读副本配置
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaConfig {
    /// 路由名称，例如 `replica`、`replica-2`
    pub name: String,
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default)]
    pub replicas: Vec<ReplicaConfig>,
}

fn default_max_connections() -> u32 {
    // 根据环境自动调整连接池大小
    // 开发环境: 10, 生产环境: 50
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

impl DatabaseConfig {
    /// 获取连接超时
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// 单个缓存区域的策略覆盖
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegionOverride {
    /// 生存时间（秒），`non_expiring = true` 时忽略
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub non_expiring: bool,
    #[serde(default)]
    pub cache_nulls: bool,
}

/// 缓存配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// 区域名 → 策略覆盖
    #[serde(default)]
    pub regions: BTreeMap<String, RegionOverride>,
}

/// 限流规则
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RateLimitRuleConfig {
    pub max_requests: u64,
    pub window_secs: u64,
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_env: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// 规则名 → 限流规则
    #[serde(default)]
    pub rate_limit: BTreeMap<String, RateLimitRuleConfig>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let config: Self = Self::figment(config_dir, &env).extract()?;

        Ok(config)
    }

    /// 构建配置源（便于测试中单独检查合并结果）
    pub fn figment(config_dir: &str, env: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("DLMP_").split("__"))
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
