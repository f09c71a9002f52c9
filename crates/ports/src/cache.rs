//! Cache trait 定义

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dlmp_errors::AppResult;

/// 远程键值存储接口
///
/// 实现方负责把后端故障转换为 `AppError`（`ExternalService` / `Timeout`），
/// 调用方（`CacheStore`）决定如何吸收这些错误。
/// `incr_by` / `decr_by` 必须由后端原子执行。
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait CachePort: Send + Sync {
    /// 获取缓存值
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// 设置缓存值，`ttl` 为 None 表示永不过期
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()>;

    /// 删除缓存，返回键是否存在
    async fn delete(&self, key: &str) -> AppResult<bool>;

    /// 检查是否存在
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// 设置过期时间，返回键是否存在
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool>;

    /// 原子递增，键不存在时从 0 开始
    async fn incr_by(&self, key: &str, delta: i64) -> AppResult<i64>;

    /// 原子递减，键不存在时从 0 开始
    async fn decr_by(&self, key: &str, delta: i64) -> AppResult<i64>;

    /// 剩余生存时间，键不存在或没有过期时间时返回 None
    async fn ttl(&self, key: &str) -> AppResult<Option<Duration>>;

    /// 按 glob 模式删除，返回删除数量
    async fn delete_by_pattern(&self, pattern: &str) -> AppResult<u64>;

    /// 连通性检查
    async fn ping(&self) -> AppResult<()>;

    /// 后端运行信息（内存、连接数、命令统计等）
    async fn info(&self) -> AppResult<BTreeMap<String, String>>;

    /// 后端名称（用于日志）
    fn backend_name(&self) -> &'static str;
}
