//! 进程内缓存后端
//!
//! 基于 moka，与 Redis 语义保持一致：递增保留原有过期时间，非整数值递增报错。
//! 读写按 tokio 时钟判断存活（测试中可以暂停和快进），
//! 过期条目由 moka 的逐条过期策略在后台回收，容量上限兜底。

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dlmp_errors::{AppError, AppResult};
use dlmp_ports::CachePort;
use moka::Expiry;
use moka::future::Cache as MokaCache;
use moka::ops::compute::{CompResult, Op};
use tokio::time::Instant;

/// 默认最大条目数
pub const DEFAULT_MEMORY_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

/// 按条目自身的截止时间过期
struct EntryExpiry;

impl Expiry<String, MemoryEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        value.remaining()
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.remaining()
    }
}

/// 进程内缓存
#[derive(Clone)]
pub struct MemoryCache {
    entries: MokaCache<String, MemoryEntry>,
    capacity: u64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// 指定最大条目数，超出后按 moka 的淘汰策略驱逐
    pub fn with_capacity(capacity: u64) -> Self {
        let entries = MokaCache::builder()
            .max_capacity(capacity)
            .expire_after(EntryExpiry)
            .build();
        Self { entries, capacity }
    }

    /// 当前存活键数量
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 底层持有的条目数（含尚未回收的过期条目）
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// 立即执行挂起的回收与维护任务
    pub async fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks().await;
    }

    async fn add(&self, key: &str, delta: i64) -> AppResult<i64> {
        let now = Instant::now();
        let owned_key = key.to_string();

        let result = self
            .entries
            .entry_by_ref(key)
            .and_try_compute_with(|existing| async move {
                let (current, expires_at) = match existing.map(|entry| entry.into_value()) {
                    Some(entry) if entry.is_live(now) => {
                        let current = entry.value.parse::<i64>().map_err(|_| {
                            AppError::external_service(format!(
                                "value at '{}' is not an integer",
                                owned_key
                            ))
                        })?;
                        (current, entry.expires_at)
                    }
                    _ => (0, None),
                };

                let next = current.checked_add(delta).ok_or_else(|| {
                    AppError::external_service(format!("increment overflow at '{}'", owned_key))
                })?;
                Ok::<_, AppError>(Op::Put(MemoryEntry {
                    value: next.to_string(),
                    expires_at,
                }))
            })
            .await?;

        match result {
            CompResult::Inserted(entry) | CompResult::ReplacedWith(entry) => {
                entry.into_value().value.parse::<i64>().map_err(|_| {
                    AppError::internal(format!("counter at '{}' was not stored", key))
                })
            }
            _ => Err(AppError::internal(format!(
                "counter at '{}' was not stored",
                key
            ))),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("capacity", &self.capacity)
            .field("entry_count", &self.entries.entry_count())
            .finish()
    }
}

#[async_trait]
impl CachePort for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        match self.entries.get(key).await {
            Some(entry) if entry.is_live(Instant::now()) => Ok(Some(entry.value)),
            Some(_) => {
                self.entries.invalidate(key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .await
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .await
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let now = Instant::now();
        let result = self
            .entries
            .entry_by_ref(key)
            .and_compute_with(|existing| async move {
                match existing.map(|entry| entry.into_value()) {
                    Some(entry) if entry.is_live(now) => {
                        if ttl.is_zero() {
                            Op::Remove
                        } else {
                            Op::Put(MemoryEntry {
                                expires_at: Some(now + ttl),
                                ..entry
                            })
                        }
                    }
                    _ => Op::Nop,
                }
            })
            .await;

        Ok(matches!(
            result,
            CompResult::ReplacedWith(_) | CompResult::Removed(_)
        ))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> AppResult<i64> {
        self.add(key, delta).await
    }

    async fn decr_by(&self, key: &str, delta: i64) -> AppResult<i64> {
        self.add(key, -delta).await
    }

    async fn ttl(&self, key: &str) -> AppResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .await
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn delete_by_pattern(&self, pattern: &str) -> AppResult<u64> {
        let now = Instant::now();
        let matched: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        let mut deleted = 0;
        for key in &matched {
            if self.entries.remove(key).await.is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn info(&self) -> AppResult<BTreeMap<String, String>> {
        let mut info = BTreeMap::new();
        info.insert("backend".to_string(), "memory".to_string());
        info.insert("keys".to_string(), self.len().to_string());
        info.insert("capacity".to_string(), self.capacity.to_string());
        Ok(info)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// glob 匹配：支持 `*`、`?` 与 `\` 转义，与 Redis KEYS/SCAN 的常用子集一致
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // 最近一个 `*` 的位置，以及它当时对应的文本位置
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some('\\') if pattern.get(p + 1) == Some(&text[t]) => {
                p += 2;
                t += 1;
                continue;
            }
            Some(&c) if c != '\\' && c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }

        match star {
            Some((star_p, star_t)) => {
                p = star_p + 1;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("dict:*", "dict:a"));
        assert!(glob_match("dict:*", "dict:"));
        assert!(!glob_match("dict:*", "user:c"));
        assert!(!glob_match("dict:*", "dictionary:a"));
        assert!(glob_match("session:*:expired", "session:abc:expired"));
        assert!(!glob_match("session:*:expired", "session:abc:live"));
        assert!(glob_match("user:?", "user:1"));
        assert!(!glob_match("user:?", "user:12"));
        assert!(glob_match("a\\*b", "a*b"));
        assert!(!glob_match("a\\*b", "axb"));
        assert!(glob_match("*", ""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("captcha:1", "1234", Some(Duration::from_secs(300)))
            .await
            .unwrap();

        assert_eq!(
            cache.ttl("captcha:1").await.unwrap(),
            Some(Duration::from_secs(300))
        );

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.exists("captcha:1").await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cache.exists("captcha:1").await.unwrap());
        assert_eq!(cache.get("captcha:1").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_preserves_ttl() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr_by("ratelimit:k", 1).await.unwrap(), 1);
        assert!(cache.expire("ratelimit:k", Duration::from_secs(60)).await.unwrap());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.incr_by("ratelimit:k", 1).await.unwrap(), 2);
        assert_eq!(
            cache.ttl("ratelimit:k").await.unwrap(),
            Some(Duration::from_secs(50))
        );

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(cache.incr_by("ratelimit:k", 1).await.unwrap(), 1);
        assert_eq!(cache.ttl("ratelimit:k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let cache = MemoryCache::new();
        cache.set("user:token:1", "\"abc\"", None).await.unwrap();
        let err = cache.incr_by("user:token:1", 1).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            cache.get("user:token:1").await.unwrap().as_deref(),
            Some("\"abc\"")
        );
    }

    #[tokio::test]
    async fn test_expire_missing_key() {
        let cache = MemoryCache::new();
        assert!(!cache.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_zero_deletes() {
        let cache = MemoryCache::new();
        cache.set("session:a", "1", None).await.unwrap();
        assert!(cache.expire("session:a", Duration::ZERO).await.unwrap());
        assert!(!cache.exists("session:a").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entries_are_reclaimed() {
        let cache = MemoryCache::new();
        for i in 0..1_000 {
            cache
                .set(
                    &format!("ratelimit:login:10.0.{}.{}", i / 256, i % 256),
                    "1",
                    Some(Duration::from_millis(100)),
                )
                .await
                .unwrap();
        }
        cache.set("system:config", "1", None).await.unwrap();

        // moka 的过期计时使用真实时钟，计时轮粒度约 1 秒
        tokio::time::sleep(Duration::from_secs(3)).await;
        cache.run_pending_tasks().await;

        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let cache = MemoryCache::with_capacity(100);
        for i in 0..1_000 {
            cache.set(&format!("user:{}", i), "1", None).await.unwrap();
        }
        cache.run_pending_tasks().await;

        assert!(cache.entry_count() <= 100);
    }
}
