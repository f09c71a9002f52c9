//! 降级缓存存储
//!
//! 包装 `CachePort`：每个操作带命令超时，后端故障被记录并转换为中性默认值
//! （`None` / `false` / `0`），从不向调用方传播。

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dlmp_errors::{AppError, AppResult};
use dlmp_ports::CachePort;
use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::outcome::{CacheFailure, Lookup};
use crate::stats::{CacheStats, CacheStatsSnapshot};

/// 默认命令超时
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// 降级缓存存储
#[derive(Clone)]
pub struct CacheStore {
    port: Arc<dyn CachePort>,
    command_timeout: Duration,
    stats: Arc<CacheStats>,
}

impl CacheStore {
    pub fn new(port: Arc<dyn CachePort>) -> Self {
        Self {
            port,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// 设置命令超时
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn backend_name(&self) -> &'static str {
        self.port.backend_name()
    }

    /// 统计快照
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// 读取并反序列化，区分未命中与后端不可用
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        match self.call("get", key, self.port.get(key)).await {
            Ok((Some(raw), elapsed)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    self.stats.record_hit();
                    self.observe("get", key, "hit", elapsed);
                    Lookup::Found(value)
                }
                Err(e) => {
                    let err = AppError::serialization(e.to_string());
                    Lookup::Unavailable(self.absorb("get", key, elapsed, &err))
                }
            },
            Ok((None, elapsed)) => {
                self.stats.record_miss();
                self.observe("get", key, "miss", elapsed);
                Lookup::Absent
            }
            Err(failure) => Lookup::Unavailable(failure),
        }
    }

    /// 读取缓存值
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.lookup(key).await.into_option()
    }

    /// 写入缓存值，`ttl` 为 None 表示永不过期；返回是否写入成功
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        match self.encode(key, value) {
            Some(raw) => self.set_encoded(key, &raw, ttl).await,
            None => false,
        }
    }

    /// 序列化为后端存储格式，失败时按序列化故障记录
    pub(crate) fn encode<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Option<String> {
        match serde_json::to_string(value) {
            Ok(raw) => Some(raw),
            Err(e) => {
                let err = AppError::serialization(e.to_string());
                self.absorb("set", key, Duration::ZERO, &err);
                None
            }
        }
    }

    pub(crate) async fn set_encoded(&self, key: &str, raw: &str, ttl: Option<Duration>) -> bool {
        match self.call("set", key, self.port.set(key, raw, ttl)).await {
            Ok(((), elapsed)) => {
                self.stats.record_write();
                self.observe("set", key, "ok", elapsed);
                true
            }
            Err(_) => false,
        }
    }

    /// 删除缓存，返回键是否存在
    pub async fn delete(&self, key: &str) -> bool {
        match self.call("delete", key, self.port.delete(key)).await {
            Ok((existed, elapsed)) => {
                if existed {
                    self.stats.record_delete(1);
                }
                self.observe("delete", key, if existed { "deleted" } else { "absent" }, elapsed);
                existed
            }
            Err(_) => false,
        }
    }

    /// 检查是否存在
    pub async fn exists(&self, key: &str) -> bool {
        match self.call("exists", key, self.port.exists(key)).await {
            Ok((exists, elapsed)) => {
                self.observe("exists", key, if exists { "hit" } else { "miss" }, elapsed);
                exists
            }
            Err(_) => false,
        }
    }

    /// 设置过期时间，返回键是否存在
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        match self.call("expire", key, self.port.expire(key, ttl)).await {
            Ok((applied, elapsed)) => {
                self.observe("expire", key, if applied { "ok" } else { "absent" }, elapsed);
                applied
            }
            Err(_) => false,
        }
    }

    /// 原子递增，保留后端故障信息
    pub async fn try_increment(&self, key: &str, delta: i64) -> Lookup<i64> {
        match self.call("increment", key, self.port.incr_by(key, delta)).await {
            Ok((value, elapsed)) => {
                self.observe("increment", key, "ok", elapsed);
                Lookup::Found(value)
            }
            Err(failure) => Lookup::Unavailable(failure),
        }
    }

    /// 原子递增，失败时返回 0
    pub async fn increment(&self, key: &str, delta: i64) -> i64 {
        self.try_increment(key, delta).await.into_option().unwrap_or(0)
    }

    /// 原子递减，保留后端故障信息
    pub async fn try_decrement(&self, key: &str, delta: i64) -> Lookup<i64> {
        match self.call("decrement", key, self.port.decr_by(key, delta)).await {
            Ok((value, elapsed)) => {
                self.observe("decrement", key, "ok", elapsed);
                Lookup::Found(value)
            }
            Err(failure) => Lookup::Unavailable(failure),
        }
    }

    /// 原子递减，失败时返回 0
    pub async fn decrement(&self, key: &str, delta: i64) -> i64 {
        self.try_decrement(key, delta).await.into_option().unwrap_or(0)
    }

    /// 按模式批量删除，返回删除数量
    ///
    /// 代价与匹配键数量成正比，仅用于管理性失效，不要放在热路径上。
    pub async fn delete_by_pattern(&self, pattern: &str) -> u64 {
        match self
            .call("delete_by_pattern", pattern, self.port.delete_by_pattern(pattern))
            .await
        {
            Ok((count, elapsed)) => {
                self.stats.record_delete(count);
                self.observe("delete_by_pattern", pattern, "ok", elapsed);
                info!(pattern = %pattern, count, "Cache entries deleted by pattern");
                count
            }
            Err(_) => 0,
        }
    }

    /// 剩余生存时间
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        match self.call("ttl", key, self.port.ttl(key)).await {
            Ok((ttl, elapsed)) => {
                self.observe("ttl", key, if ttl.is_some() { "ok" } else { "absent" }, elapsed);
                ttl
            }
            Err(_) => None,
        }
    }

    /// 连通性检查
    pub async fn ping(&self) -> bool {
        match self.call("ping", "-", self.port.ping()).await {
            Ok(((), elapsed)) => {
                self.observe("ping", "-", "ok", elapsed);
                true
            }
            Err(_) => false,
        }
    }

    /// 后端运行信息，失败时为空
    pub async fn backend_info(&self) -> BTreeMap<String, String> {
        match self.call("info", "-", self.port.info()).await {
            Ok((info, elapsed)) => {
                self.observe("info", "-", "ok", elapsed);
                info
            }
            Err(_) => BTreeMap::new(),
        }
    }

    /// 执行后端调用：施加超时，失败时记录并返回故障类型
    async fn call<T, F>(
        &self,
        operation: &'static str,
        key: &str,
        fut: F,
    ) -> Result<(T, Duration), CacheFailure>
    where
        F: Future<Output = AppResult<T>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout(format!(
                "{} exceeded {}ms",
                operation,
                self.command_timeout.as_millis()
            ))),
        };

        let elapsed = start.elapsed();
        match result {
            Ok(value) => Ok((value, elapsed)),
            Err(e) => Err(self.absorb(operation, key, elapsed, &e)),
        }
    }

    fn absorb(
        &self,
        operation: &'static str,
        key: &str,
        elapsed: Duration,
        err: &AppError,
    ) -> CacheFailure {
        let failure = CacheFailure::from_error(err);
        self.stats.record_failure(failure);
        record_metrics(operation, failure.as_str(), elapsed);
        warn!(
            operation,
            key = %key,
            outcome = failure.as_str(),
            latency_ms = elapsed.as_secs_f64() * 1000.0,
            backend = self.port.backend_name(),
            error = %err,
            "Cache operation failed, falling back to default"
        );
        failure
    }

    fn observe(&self, operation: &'static str, key: &str, outcome: &'static str, elapsed: Duration) {
        record_metrics(operation, outcome, elapsed);
        debug!(
            operation,
            key = %key,
            outcome,
            latency_ms = elapsed.as_secs_f64() * 1000.0,
            backend = self.port.backend_name(),
            "Cache operation"
        );
    }

    pub(crate) fn record_skipped_null(&self) {
        self.stats.record_skipped_null();
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.port.backend_name())
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

fn record_metrics(operation: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!("cache_operations_total", "operation" => operation, "outcome" => outcome).increment(1);
    histogram!("cache_operation_duration_ms", "operation" => operation)
        .record(elapsed.as_secs_f64() * 1000.0);
}
