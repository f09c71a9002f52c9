//! 区域策略表
//!
//! 每个区域一条策略：TTL、是否缓存空值、易变性分级。
//! 分级之间的 TTL 顺序（会话类 < 实体类 < 字典/系统类）在启动时校验。

use std::collections::BTreeMap;
use std::time::Duration;

use dlmp_errors::{AppError, AppResult};

use crate::key::validate_region_name;

/// 内置区域名
pub mod regions {
    pub const USER: &str = "user";
    pub const CASE: &str = "case";
    pub const PERMISSION: &str = "permission";
    pub const SESSION: &str = "session";
    pub const CAPTCHA: &str = "captcha";
    pub const RATE_LIMIT: &str = "ratelimit";
    pub const STATISTICS: &str = "stats";
    pub const DICT: &str = "dict";
    pub const SYSTEM: &str = "system";
}

/// 区域易变性分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegionTier {
    /// 会话、验证码、限流计数（分钟级）
    Ephemeral,
    /// 实体快照（数十分钟到数小时）
    Entity,
    /// 字典、系统参数（数小时以上）
    Reference,
}

impl RegionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ephemeral => "ephemeral",
            Self::Entity => "entity",
            Self::Reference => "reference",
        }
    }
}

/// 单个区域的缓存策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPolicy {
    region: String,
    ttl: Option<Duration>,
    cache_nulls: bool,
    tier: RegionTier,
}

impl RegionPolicy {
    /// 带过期时间的区域策略
    pub fn new(region: impl Into<String>, ttl: Duration, tier: RegionTier) -> Self {
        Self {
            region: region.into(),
            ttl: Some(ttl),
            cache_nulls: false,
            tier,
        }
    }

    /// 永不过期的区域策略
    pub fn non_expiring(region: impl Into<String>, tier: RegionTier) -> Self {
        Self {
            region: region.into(),
            ttl: None,
            cache_nulls: false,
            tier,
        }
    }

    pub fn with_cache_nulls(mut self, cache_nulls: bool) -> Self {
        self.cache_nulls = cache_nulls;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// None 表示永不过期
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn cache_nulls(&self) -> bool {
        self.cache_nulls
    }

    pub fn tier(&self) -> RegionTier {
        self.tier
    }

    pub fn is_non_expiring(&self) -> bool {
        self.ttl.is_none()
    }

    /// 用于顺序比较的有效生存期，永不过期视为无限
    fn horizon(&self) -> Duration {
        self.ttl.unwrap_or(Duration::MAX)
    }

    fn validate(&self) -> AppResult<()> {
        validate_region_name(&self.region)?;
        if self.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(AppError::configuration(format!(
                "region '{}' has a zero TTL; mark it non-expiring instead",
                self.region
            )));
        }
        Ok(())
    }
}

/// 区域策略表，启动后只读
#[derive(Debug, Clone, Default)]
pub struct RegionPolicyTable {
    policies: BTreeMap<String, RegionPolicy>,
}

impl RegionPolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置区域的默认策略
    pub fn defaults() -> Self {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 60 * MINUTE;

        let defaults = [
            (regions::SESSION, 20 * MINUTE, RegionTier::Ephemeral),
            (regions::CAPTCHA, 5 * MINUTE, RegionTier::Ephemeral),
            (regions::RATE_LIMIT, MINUTE, RegionTier::Ephemeral),
            (regions::USER, 30 * MINUTE, RegionTier::Entity),
            (regions::PERMISSION, HOUR, RegionTier::Entity),
            (regions::CASE, 2 * HOUR, RegionTier::Entity),
            (regions::STATISTICS, 6 * HOUR, RegionTier::Entity),
            (regions::DICT, 12 * HOUR, RegionTier::Reference),
            (regions::SYSTEM, 24 * HOUR, RegionTier::Reference),
        ];

        let policies = defaults
            .into_iter()
            .map(|(region, secs, tier)| {
                (
                    region.to_string(),
                    RegionPolicy::new(region, Duration::from_secs(secs), tier),
                )
            })
            .collect();

        Self { policies }
    }

    /// 注册新区域，区域名重复或非法时报错
    pub fn insert(&mut self, policy: RegionPolicy) -> AppResult<()> {
        policy.validate()?;
        if self.policies.contains_key(policy.region()) {
            return Err(AppError::configuration(format!(
                "region '{}' already has a policy",
                policy.region()
            )));
        }
        self.policies.insert(policy.region.clone(), policy);
        Ok(())
    }

    /// 覆盖已知区域的 TTL，None 表示永不过期
    pub fn override_ttl(&mut self, region: &str, ttl: Option<Duration>) -> AppResult<()> {
        let policy = self.require_mut(region)?;
        let mut updated = policy.clone();
        updated.ttl = ttl;
        updated.validate()?;
        *policy = updated;
        Ok(())
    }

    /// 覆盖已知区域的空值缓存规则
    pub fn override_cache_nulls(&mut self, region: &str, cache_nulls: bool) -> AppResult<()> {
        self.require_mut(region)?.cache_nulls = cache_nulls;
        Ok(())
    }

    pub fn get(&self, region: &str) -> Option<&RegionPolicy> {
        self.policies.get(region)
    }

    /// 获取区域策略，缺失时为配置错误
    pub fn require(&self, region: &str) -> AppResult<&RegionPolicy> {
        self.policies.get(region).ok_or_else(|| missing_policy(region))
    }

    fn require_mut(&mut self, region: &str) -> AppResult<&mut RegionPolicy> {
        self.policies
            .get_mut(region)
            .ok_or_else(|| missing_policy(region))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegionPolicy> {
        self.policies.values()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// 校验每条策略以及分级之间的 TTL 顺序
    pub fn validate(&self) -> AppResult<()> {
        for policy in self.policies.values() {
            policy.validate()?;
        }

        let tiers = [RegionTier::Ephemeral, RegionTier::Entity, RegionTier::Reference];
        for pair in tiers.windows(2) {
            let (shorter, longer) = (pair[0], pair[1]);
            let Some(slowest) = self.longest_in(shorter) else {
                continue;
            };
            let Some(fastest) = self.shortest_in(longer) else {
                continue;
            };
            if slowest.horizon() >= fastest.horizon() {
                return Err(AppError::configuration(format!(
                    "{} region '{}' (ttl {}) must expire before {} region '{}' (ttl {})",
                    shorter.as_str(),
                    slowest.region,
                    describe_ttl(slowest.ttl),
                    longer.as_str(),
                    fastest.region,
                    describe_ttl(fastest.ttl),
                )));
            }
        }
        Ok(())
    }

    fn longest_in(&self, tier: RegionTier) -> Option<&RegionPolicy> {
        self.policies
            .values()
            .filter(|policy| policy.tier == tier)
            .max_by_key(|policy| policy.horizon())
    }

    fn shortest_in(&self, tier: RegionTier) -> Option<&RegionPolicy> {
        self.policies
            .values()
            .filter(|policy| policy.tier == tier)
            .min_by_key(|policy| policy.horizon())
    }
}

fn missing_policy(region: &str) -> AppError {
    AppError::configuration(format!("no cache policy registered for region '{}'", region))
}

fn describe_ttl(ttl: Option<Duration>) -> String {
    match ttl {
        Some(ttl) => format!("{}s", ttl.as_secs()),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let table = RegionPolicyTable::defaults();
        assert!(table.validate().is_ok());
        assert_eq!(table.len(), 9);
        assert!(table.iter().all(|policy| !policy.cache_nulls()));
    }

    #[test]
    fn test_default_ordering() {
        let table = RegionPolicyTable::defaults();
        let ttl = |region: &str| table.require(region).unwrap().ttl().unwrap();

        assert!(ttl(regions::SESSION) < ttl(regions::USER));
        assert!(ttl(regions::CASE) < ttl(regions::DICT));
        assert!(ttl(regions::STATISTICS) < ttl(regions::SYSTEM));
        assert_eq!(ttl(regions::CAPTCHA), Duration::from_secs(300));
    }

    #[test]
    fn test_override_breaking_order_is_rejected() {
        let mut table = RegionPolicyTable::defaults();
        table
            .override_ttl(regions::SESSION, Some(Duration::from_secs(48 * 3600)))
            .unwrap();

        let err = table.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_non_expiring_reference_region() {
        let mut table = RegionPolicyTable::defaults();
        table.override_ttl(regions::SYSTEM, None).unwrap();
        assert!(table.validate().is_ok());
        assert!(table.require(regions::SYSTEM).unwrap().is_non_expiring());

        table.override_ttl(regions::USER, None).unwrap();
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let mut table = RegionPolicyTable::defaults();
        assert!(table.override_ttl(regions::USER, Some(Duration::ZERO)).is_err());
    }

    #[test]
    fn test_unknown_region() {
        let mut table = RegionPolicyTable::defaults();
        assert!(table.require("audit").unwrap_err().is_configuration());
        assert!(table.override_cache_nulls("audit", true).is_err());
    }

    #[test]
    fn test_insert_custom_region() {
        let mut table = RegionPolicyTable::defaults();
        table
            .insert(RegionPolicy::new(
                "org",
                Duration::from_secs(3600),
                RegionTier::Entity,
            ))
            .unwrap();
        assert!(table.validate().is_ok());

        let duplicate = RegionPolicy::new("org", Duration::from_secs(60), RegionTier::Entity);
        assert!(table.insert(duplicate).is_err());
        let invalid = RegionPolicy::new("a:b", Duration::from_secs(60), RegionTier::Entity);
        assert!(table.insert(invalid).is_err());
    }
}
