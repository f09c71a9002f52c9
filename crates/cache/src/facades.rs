//! 业务区域门面
//!
//! 每个业务领域一个门面，启动时从 `CacheRegistry` 一次性构造并注入调用方。

use std::collections::BTreeMap;
use std::time::Duration;

use dlmp_errors::AppResult;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::key::compose;
use crate::policy::regions;
use crate::rate_limiter::RateLimiter;
use crate::region::CacheRegion;
use crate::registry::CacheRegistry;
use crate::stats::CacheStatsSnapshot;

const TOKEN_TTL: Duration = Duration::from_secs(2 * 3600);
const CASE_STATUS_TTL: Duration = Duration::from_secs(3600);
const CASE_ASSIGNMENT_TTL: Duration = Duration::from_secs(4 * 3600);
const DASHBOARD_TTL: Duration = Duration::from_secs(10 * 60);
const CASE_STATS_TTL: Duration = Duration::from_secs(3600);

/// 用户缓存：基本信息、令牌、权限集合
#[derive(Debug, Clone)]
pub struct UserCache {
    users: CacheRegion,
    permissions: CacheRegion,
}

impl UserCache {
    pub fn new(users: CacheRegion, permissions: CacheRegion) -> Self {
        Self { users, permissions }
    }

    pub async fn get_info<T: DeserializeOwned>(&self, user_id: i64) -> Option<T> {
        self.users.get_entity(&info_key(user_id)).await
    }

    pub async fn put_info<T: Serialize>(&self, user_id: i64, info: T) -> T {
        self.users.put_entity(&info_key(user_id), info).await
    }

    pub async fn get_token(&self, user_id: i64) -> Option<String> {
        self.users.get_entity(&token_key(user_id)).await
    }

    pub async fn put_token(&self, user_id: i64, token: &str) {
        self.users
            .put_entity_with_ttl(&token_key(user_id), token, Some(TOKEN_TTL))
            .await;
    }

    pub async fn get_permissions(&self, user_id: i64) -> Option<Vec<String>> {
        self.permissions.get_entity(&user_id.to_string()).await
    }

    pub async fn put_permissions(&self, user_id: i64, permissions: Vec<String>) -> Vec<String> {
        self.permissions
            .put_entity(&user_id.to_string(), permissions)
            .await
    }

    /// 用户信息变更后清除该用户的全部缓存
    pub async fn evict_user(&self, user_id: i64) {
        self.users.evict_entity(&info_key(user_id)).await;
        self.users.evict_entity(&token_key(user_id)).await;
        self.permissions.evict_entity(&user_id.to_string()).await;
    }
}

/// 案件缓存：基本信息、状态、分配
#[derive(Debug, Clone)]
pub struct CaseCache {
    cases: CacheRegion,
}

impl CaseCache {
    pub fn new(cases: CacheRegion) -> Self {
        Self { cases }
    }

    pub async fn get_info<T: DeserializeOwned>(&self, case_id: i64) -> Option<T> {
        self.cases.get_entity(&info_key(case_id)).await
    }

    pub async fn put_info<T: Serialize>(&self, case_id: i64, info: T) -> T {
        self.cases.put_entity(&info_key(case_id), info).await
    }

    pub async fn get_status(&self, case_id: i64) -> Option<String> {
        self.cases.get_entity(&status_key(case_id)).await
    }

    pub async fn put_status(&self, case_id: i64, status: &str) {
        self.cases
            .put_entity_with_ttl(&status_key(case_id), status, Some(CASE_STATUS_TTL))
            .await;
    }

    pub async fn get_assignment<T: DeserializeOwned>(&self, case_id: i64) -> Option<T> {
        self.cases.get_entity(&assignment_key(case_id)).await
    }

    pub async fn put_assignment<T: Serialize>(&self, case_id: i64, assignment: T) -> T {
        self.cases
            .put_entity_with_ttl(&assignment_key(case_id), assignment, Some(CASE_ASSIGNMENT_TTL))
            .await
    }

    pub async fn evict_case(&self, case_id: i64) {
        self.cases.evict_entity(&info_key(case_id)).await;
        self.cases.evict_entity(&status_key(case_id)).await;
        self.cases.evict_entity(&assignment_key(case_id)).await;
    }
}

/// 字典缓存，按字典类型存储
#[derive(Debug, Clone)]
pub struct DictCache {
    dicts: CacheRegion,
}

impl DictCache {
    pub fn new(dicts: CacheRegion) -> Self {
        Self { dicts }
    }

    pub async fn get_data<T: DeserializeOwned>(&self, dict_type: &str) -> Option<T> {
        self.dicts.get_entity(dict_type).await
    }

    pub async fn put_data<T: Serialize>(&self, dict_type: &str, data: T) -> T {
        self.dicts.put_entity(dict_type, data).await
    }

    pub async fn evict(&self, dict_type: &str) -> bool {
        self.dicts.evict_entity(dict_type).await
    }

    /// 清空全部字典（字典重载时使用）
    pub async fn clear_all(&self) -> u64 {
        self.dicts.evict_all().await
    }

    /// 预热字典，返回写入的条目数
    pub async fn warm_up<T: Serialize>(
        &self,
        entries: impl IntoIterator<Item = (String, T)>,
    ) -> usize {
        let mut count = 0;
        for (dict_type, data) in entries {
            self.dicts.put_entity(&dict_type, data).await;
            count += 1;
        }
        info!(count, "Dictionary cache warmed up");
        count
    }
}

/// 会话缓存
#[derive(Debug, Clone)]
pub struct SessionCache {
    sessions: CacheRegion,
}

impl SessionCache {
    pub fn new(sessions: CacheRegion) -> Self {
        Self { sessions }
    }

    pub async fn put<T: Serialize>(&self, session_id: &str, data: T) -> T {
        self.sessions.put_entity(session_id, data).await
    }

    pub async fn get<T: DeserializeOwned>(&self, session_id: &str) -> Option<T> {
        self.sessions.get_entity(session_id).await
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.evict_entity(session_id).await
    }

    pub async fn is_valid(&self, session_id: &str) -> bool {
        self.sessions.exists(session_id).await
    }

    /// 续期：仅对仍然有效的会话重置为区域 TTL
    pub async fn extend(&self, session_id: &str) -> bool {
        self.sessions.refresh(session_id).await
    }

    pub async fn remaining(&self, session_id: &str) -> Option<Duration> {
        self.sessions.ttl(session_id).await
    }
}

/// 统计缓存：仪表盘、案件统计、用户统计
#[derive(Debug, Clone)]
pub struct StatisticsCache {
    stats: CacheRegion,
}

impl StatisticsCache {
    pub fn new(stats: CacheRegion) -> Self {
        Self { stats }
    }

    pub async fn get_dashboard<T: DeserializeOwned>(&self) -> Option<T> {
        self.stats.get_entity("dashboard").await
    }

    pub async fn put_dashboard<T: Serialize>(&self, stats: T) -> T {
        self.stats
            .put_entity_with_ttl("dashboard", stats, Some(DASHBOARD_TTL))
            .await
    }

    pub async fn get_case_stats<T: DeserializeOwned>(&self, period: &str) -> Option<T> {
        self.stats.get_entity(&compose(&["case", period])).await
    }

    pub async fn put_case_stats<T: Serialize>(&self, period: &str, stats: T) -> T {
        self.stats
            .put_entity_with_ttl(&compose(&["case", period]), stats, Some(CASE_STATS_TTL))
            .await
    }

    pub async fn get_user_stats<T: DeserializeOwned>(&self, period: &str) -> Option<T> {
        self.stats.get_entity(&compose(&["user", period])).await
    }

    pub async fn put_user_stats<T: Serialize>(&self, period: &str, stats: T) -> T {
        self.stats.put_entity(&compose(&["user", period]), stats).await
    }

    pub async fn clear_all(&self) -> u64 {
        self.stats.evict_all().await
    }
}

/// 系统参数缓存
#[derive(Debug, Clone)]
pub struct SystemCache {
    system: CacheRegion,
}

impl SystemCache {
    pub fn new(system: CacheRegion) -> Self {
        Self { system }
    }

    pub async fn get_config<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.system.get_entity(name).await
    }

    pub async fn put_config<T: Serialize>(&self, name: &str, value: T) -> T {
        self.system.put_entity(name, value).await
    }

    pub async fn evict_config(&self, name: &str) -> bool {
        self.system.evict_entity(name).await
    }
}

/// 缓存管理器：持有注册表与全部业务门面
#[derive(Debug, Clone)]
pub struct CacheManager {
    registry: CacheRegistry,
    users: UserCache,
    cases: CaseCache,
    dicts: DictCache,
    sessions: SessionCache,
    statistics: StatisticsCache,
    system: SystemCache,
    rate_limiter: RateLimiter,
}

impl CacheManager {
    /// 从注册表构造全部门面，门面依赖的区域缺失时为配置错误
    pub fn from_registry(registry: CacheRegistry) -> AppResult<Self> {
        let region = |name: &str| registry.region(name).cloned();

        let manager = Self {
            users: UserCache::new(region(regions::USER)?, region(regions::PERMISSION)?),
            cases: CaseCache::new(region(regions::CASE)?),
            dicts: DictCache::new(region(regions::DICT)?),
            sessions: SessionCache::new(region(regions::SESSION)?),
            statistics: StatisticsCache::new(region(regions::STATISTICS)?),
            system: SystemCache::new(region(regions::SYSTEM)?),
            rate_limiter: RateLimiter::new(region(regions::RATE_LIMIT)?),
            registry,
        };

        info!(
            backend = manager.registry.store().backend_name(),
            regions = manager.registry.names().count(),
            "Cache manager initialized"
        );
        Ok(manager)
    }

    /// 替换限流器（注册命名规则后）
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn region(&self, name: &str) -> AppResult<&CacheRegion> {
        self.registry.region(name)
    }

    pub fn users(&self) -> &UserCache {
        &self.users
    }

    pub fn cases(&self) -> &CaseCache {
        &self.cases
    }

    pub fn dicts(&self) -> &DictCache {
        &self.dicts
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    pub fn statistics(&self) -> &StatisticsCache {
        &self.statistics
    }

    pub fn system(&self) -> &SystemCache {
        &self.system
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.registry.stats()
    }

    pub async fn backend_info(&self) -> BTreeMap<String, String> {
        self.registry.store().backend_info().await
    }

    pub async fn ping(&self) -> bool {
        self.registry.store().ping().await
    }
}

fn info_key(id: i64) -> String {
    compose(&["info", &id.to_string()])
}

fn token_key(id: i64) -> String {
    compose(&["token", &id.to_string()])
}

fn status_key(id: i64) -> String {
    compose(&["status", &id.to_string()])
}

fn assignment_key(id: i64) -> String {
    compose(&["assignment", &id.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;
    use crate::policy::RegionPolicyTable;
    use crate::store::CacheStore;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct DictItem {
        code: String,
        label: String,
    }

    fn manager() -> CacheManager {
        let store = CacheStore::new(Arc::new(MemoryCache::new()));
        let registry = CacheRegistry::from_policies(store, &RegionPolicyTable::defaults()).unwrap();
        CacheManager::from_registry(registry).unwrap()
    }

    #[tokio::test]
    async fn test_user_cache() {
        let manager = manager();
        let users = manager.users();

        users.put_info(1, "alice".to_string()).await;
        users.put_token(1, "jwt-token").await;
        users
            .put_permissions(1, vec!["case:read".to_string()])
            .await;

        assert_eq!(users.get_info::<String>(1).await.as_deref(), Some("alice"));
        assert_eq!(users.get_token(1).await.as_deref(), Some("jwt-token"));
        assert!(manager.registry().store().exists("permission:1").await);

        users.evict_user(1).await;
        assert_eq!(users.get_info::<String>(1).await, None);
        assert_eq!(users.get_token(1).await, None);
        assert_eq!(users.get_permissions(1).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auxiliary_ttls() {
        let manager = manager();
        manager.users().put_token(7, "t").await;
        manager.cases().put_assignment(7, "officer-3").await;
        manager.statistics().put_dashboard(vec![1, 2, 3]).await;

        let store = manager.registry().store();
        assert_eq!(store.ttl("user:token:7").await, Some(TOKEN_TTL));
        assert_eq!(store.ttl("case:assignment:7").await, Some(CASE_ASSIGNMENT_TTL));
        assert_eq!(store.ttl("stats:dashboard").await, Some(DASHBOARD_TTL));
    }

    #[tokio::test]
    async fn test_dict_warm_up_and_clear() {
        let manager = manager();
        let dicts = manager.dicts();
        let gender = vec![DictItem {
            code: "M".to_string(),
            label: "男".to_string(),
        }];

        let warmed = dicts
            .warm_up([
                ("gender".to_string(), gender.clone()),
                ("case_type".to_string(), Vec::new()),
            ])
            .await;
        assert_eq!(warmed, 2);
        assert_eq!(dicts.get_data::<Vec<DictItem>>("gender").await, Some(gender));

        assert_eq!(dicts.clear_all().await, 2);
        assert_eq!(dicts.get_data::<Vec<DictItem>>("gender").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_extend_only_when_valid() {
        let manager = manager();
        let sessions = manager.sessions();

        sessions.put("s1", "payload").await;
        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(sessions.extend("s1").await);
        assert_eq!(sessions.remaining("s1").await, Some(Duration::from_secs(1200)));

        assert!(sessions.remove("s1").await);
        assert!(!sessions.is_valid("s1").await);
        assert!(!sessions.extend("s1").await);
    }

    #[tokio::test]
    async fn test_system_cache() {
        let manager = manager();
        manager.system().put_config("upload.max_mb", 50).await;
        assert_eq!(manager.system().get_config::<i32>("upload.max_mb").await, Some(50));
        assert!(manager.system().evict_config("upload.max_mb").await);
    }

    #[test]
    fn test_missing_facade_region_is_configuration_error() {
        let store = CacheStore::new(Arc::new(MemoryCache::new()));
        let mut table = RegionPolicyTable::new();
        table
            .insert(crate::policy::RegionPolicy::new(
                regions::USER,
                Duration::from_secs(60),
                crate::policy::RegionTier::Entity,
            ))
            .unwrap();
        let registry = CacheRegistry::from_policies(store, &table).unwrap();

        let err = CacheManager::from_registry(registry).unwrap_err();
        assert!(err.is_configuration());
    }
}
