//! 区域缓存
//!
//! 按区域封装 `CacheStore`：键自动加区域前缀，写入使用区域 TTL。
//! 旁路缓存由调用方显式完成：`get_entity` 未命中时从数据源加载，再 `put_entity`。

use std::future::Future;
use std::time::Duration;

use dlmp_errors::AppResult;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::key::CacheKey;
use crate::outcome::{CacheFailure, Lookup};
use crate::policy::RegionPolicy;
use crate::store::CacheStore;

const NULL_LITERAL: &str = "null";

/// 单个区域的缓存门面
#[derive(Clone)]
pub struct CacheRegion {
    policy: RegionPolicy,
    store: CacheStore,
}

impl CacheRegion {
    pub fn new(policy: RegionPolicy, store: CacheStore) -> Self {
        Self { policy, store }
    }

    pub fn name(&self) -> &str {
        self.policy.region()
    }

    pub fn policy(&self) -> &RegionPolicy {
        &self.policy
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// 区域内的规范键
    pub fn key(&self, local_key: &str) -> CacheKey {
        CacheKey::new(self.policy.region(), local_key)
    }

    fn canonical(&self, local_key: &str) -> String {
        self.key(local_key).canonical()
    }

    /// 读取实体，区分未命中与后端不可用
    pub async fn lookup_entity<T: DeserializeOwned>(&self, local_key: &str) -> Lookup<T> {
        self.store.lookup(&self.canonical(local_key)).await
    }

    /// 读取实体
    pub async fn get_entity<T: DeserializeOwned>(&self, local_key: &str) -> Option<T> {
        self.lookup_entity(local_key).await.into_option()
    }

    /// 以区域 TTL 写入实体，返回写入的值
    pub async fn put_entity<T: Serialize>(&self, local_key: &str, value: T) -> T {
        self.put_entity_with_ttl(local_key, value, self.policy.ttl())
            .await
    }

    /// 以指定 TTL 写入实体，返回写入的值
    ///
    /// 区域不缓存空值时，空值不会写入，并删除该键上的旧值。
    pub async fn put_entity_with_ttl<T: Serialize>(
        &self,
        local_key: &str,
        value: T,
        ttl: Option<Duration>,
    ) -> T {
        let key = self.canonical(local_key);
        let Some(raw) = self.store.encode(&key, &value) else {
            return value;
        };

        if raw == NULL_LITERAL && !self.policy.cache_nulls() {
            self.store.record_skipped_null();
            self.store.delete(&key).await;
            debug!(key = %key, region = self.name(), "Null value not cached");
            return value;
        }

        self.store.set_encoded(&key, &raw, ttl).await;
        value
    }

    /// 删除实体，返回键是否存在
    pub async fn evict_entity(&self, local_key: &str) -> bool {
        self.store.delete(&self.canonical(local_key)).await
    }

    /// 清空整个区域，返回删除数量
    ///
    /// 代价与区域内键数量成正比，仅用于管理性失效（如字典重载）。
    pub async fn evict_all(&self) -> u64 {
        self.store
            .delete_by_pattern(&CacheKey::region_pattern(self.name()))
            .await
    }

    pub async fn exists(&self, local_key: &str) -> bool {
        self.store.exists(&self.canonical(local_key)).await
    }

    /// 设置过期时间，返回键是否存在
    pub async fn expire(&self, local_key: &str, ttl: Duration) -> bool {
        self.store.expire(&self.canonical(local_key), ttl).await
    }

    /// 将过期时间重置为区域 TTL；永不过期的区域只检查键是否存在
    pub async fn refresh(&self, local_key: &str) -> bool {
        match self.policy.ttl() {
            Some(ttl) => self.expire(local_key, ttl).await,
            None => self.exists(local_key).await,
        }
    }

    /// 剩余生存时间
    pub async fn ttl(&self, local_key: &str) -> Option<Duration> {
        self.store.ttl(&self.canonical(local_key)).await
    }

    /// 原子递增
    pub async fn increment(&self, local_key: &str, delta: i64) -> Lookup<i64> {
        self.store
            .try_increment(&self.canonical(local_key), delta)
            .await
    }

    /// 原子递减
    pub async fn decrement(&self, local_key: &str, delta: i64) -> Lookup<i64> {
        self.store
            .try_decrement(&self.canonical(local_key), delta)
            .await
    }

    /// 旁路缓存：命中直接返回，未命中调用 `loader` 加载并回填
    ///
    /// `loader` 的错误原样返回；缓存故障不会返回错误。
    /// 后端不可用时跳过回填，避免在同一请求中再次等待超时。
    pub async fn get_or_load<T, F, Fut>(&self, local_key: &str, loader: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let populate = match self.lookup_entity::<T>(local_key).await {
            Lookup::Found(value) => return Ok(value),
            Lookup::Absent => true,
            Lookup::Unavailable(CacheFailure::Serialization) => true,
            Lookup::Unavailable(_) => false,
        };

        let value = loader().await?;
        if populate {
            Ok(self.put_entity(local_key, value).await)
        } else {
            Ok(value)
        }
    }
}

impl std::fmt::Debug for CacheRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegion")
            .field("policy", &self.policy)
            .field("backend", &self.store.backend_name())
            .finish()
    }
}
