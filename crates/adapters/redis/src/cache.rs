//! Redis Cache 实现

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dlmp_errors::{AppError, AppResult};
use dlmp_ports::CachePort;
use redis::{AsyncCommands, RedisError};
use tracing::debug;

use crate::config::{KeyPrefix, RedisMode};
use crate::connection::RedisConnection;

/// 每批 SCAN 的建议数量
const SCAN_BATCH: usize = 500;

/// INFO 中保留的字段
const INFO_FIELDS: &[&str] = &[
    "redis_version",
    "redis_mode",
    "uptime_in_seconds",
    "used_memory",
    "used_memory_human",
    "used_memory_peak_human",
    "connected_clients",
    "total_commands_processed",
    "instantaneous_ops_per_sec",
    "keyspace_hits",
    "keyspace_misses",
    "expired_keys",
    "evicted_keys",
];

/// Redis Cache
#[derive(Debug, Clone)]
pub struct RedisCache {
    conn: RedisConnection,
    prefix: KeyPrefix,
}

impl RedisCache {
    pub fn new(conn: RedisConnection) -> Self {
        Self {
            conn,
            prefix: KeyPrefix::default(),
        }
    }

    /// 设置键前缀
    pub fn with_key_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = KeyPrefix::new(prefix);
        self
    }

    fn key(&self, key: &str) -> String {
        self.prefix.apply(key)
    }

    /// 单机模式：SCAN 游标遍历，分批删除
    async fn scan_delete(&self, pattern: &str) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error("scan", e))?;

            if !keys.is_empty() {
                let count: u64 = conn
                    .del(&keys)
                    .await
                    .map_err(|e| redis_error("delete_by_pattern", e))?;
                deleted += count;
            }

            if next == 0 {
                return Ok(deleted);
            }
            cursor = next;
        }
    }

    /// 集群模式：KEYS 汇总各主节点结果，逐键删除（键可能分布在不同槽位）
    async fn cluster_delete(&self, pattern: &str) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| redis_error("keys", e))?;

        let mut deleted: u64 = 0;
        for key in &keys {
            let count: u64 = conn
                .del(key)
                .await
                .map_err(|e| redis_error("delete_by_pattern", e))?;
            deleted += count;
        }
        Ok(deleted)
    }
}

#[async_trait]
impl CachePort for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(self.key(key))
            .await
            .map_err(|e| redis_error("get", e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        match ttl {
            // PSETEX 不接受 0，零 TTL 等价于立即过期
            Some(duration) if duration.as_millis() == 0 => conn
                .del::<_, ()>(&key)
                .await
                .map_err(|e| redis_error("set", e)),
            Some(duration) => conn
                .pset_ex(&key, value, millis(duration))
                .await
                .map_err(|e| redis_error("set", e)),
            None => conn
                .set(&key, value)
                .await
                .map_err(|e| redis_error("set", e)),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let count: u64 = conn
            .del(self.key(key))
            .await
            .map_err(|e| redis_error("delete", e))?;
        Ok(count > 0)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(self.key(key))
            .await
            .map_err(|e| redis_error("exists", e))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        conn.pexpire(self.key(key), millis(ttl) as i64)
            .await
            .map_err(|e| redis_error("expire", e))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> AppResult<i64> {
        let mut conn = self.conn.clone();
        conn.incr(self.key(key), delta)
            .await
            .map_err(|e| redis_error("incr", e))
    }

    async fn decr_by(&self, key: &str, delta: i64) -> AppResult<i64> {
        let mut conn = self.conn.clone();
        conn.decr(self.key(key), delta)
            .await
            .map_err(|e| redis_error("decr", e))
    }

    async fn ttl(&self, key: &str) -> AppResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        let ttl: i64 = conn
            .pttl(self.key(key))
            .await
            .map_err(|e| redis_error("ttl", e))?;

        // -2 表示键不存在，-1 表示没有过期时间
        Ok(u64::try_from(ttl).ok().map(Duration::from_millis))
    }

    async fn delete_by_pattern(&self, pattern: &str) -> AppResult<u64> {
        let pattern = self.key(pattern);
        let deleted = match self.conn.mode() {
            RedisMode::Standalone => self.scan_delete(&pattern).await?,
            RedisMode::Cluster => self.cluster_delete(&pattern).await?,
        };
        debug!(pattern = %pattern, deleted, "Redis keys deleted by pattern");
        Ok(deleted)
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| redis_error("ping", e))?;
        Ok(())
    }

    async fn info(&self) -> AppResult<BTreeMap<String, String>> {
        let mut conn = self.conn.clone();
        let raw: String = redis::cmd("INFO")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("info", e))?;

        let mut info = parse_info(&raw);
        info.insert("backend".to_string(), "redis".to_string());
        if let Some(prefix) = self.prefix.as_deref() {
            info.insert("key_prefix".to_string(), prefix.to_string());
        }
        Ok(info)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Redis 错误分类：超时与其他后端故障
fn redis_error(operation: &str, e: RedisError) -> AppError {
    if e.is_timeout() {
        AppError::timeout(format!("Redis {} timed out: {}", operation, e))
    } else {
        AppError::external_service(format!("Redis {} failed: {}", operation, e))
    }
}

/// 解析 INFO 输出，保留常用字段与各库的键空间统计
pub fn parse_info(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .filter(|(field, _)| INFO_FIELDS.contains(field) || is_keyspace_field(field))
        .map(|(field, value)| (field.to_string(), value.to_string()))
        .collect()
}

fn is_keyspace_field(field: &str) -> bool {
    field
        .strip_prefix("db")
        .is_some_and(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
}
