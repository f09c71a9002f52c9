//! 区域注册表
//!
//! 启动时按策略表一次性构造全部 `CacheRegion`，之后只读，按名称注入调用方。

use std::collections::BTreeMap;

use dlmp_errors::{AppError, AppResult};
use tracing::info;

use crate::policy::RegionPolicyTable;
use crate::region::CacheRegion;
use crate::stats::CacheStatsSnapshot;
use crate::store::CacheStore;

/// 区域注册表
#[derive(Debug, Clone)]
pub struct CacheRegistry {
    store: CacheStore,
    regions: BTreeMap<String, CacheRegion>,
}

impl CacheRegistry {
    /// 校验策略表并为每条策略创建区域
    pub fn from_policies(store: CacheStore, table: &RegionPolicyTable) -> AppResult<Self> {
        table.validate()?;

        let regions: BTreeMap<String, CacheRegion> = table
            .iter()
            .map(|policy| {
                (
                    policy.region().to_string(),
                    CacheRegion::new(policy.clone(), store.clone()),
                )
            })
            .collect();

        for region in regions.values() {
            info!(
                region = region.name(),
                ttl_secs = region.policy().ttl().map(|ttl| ttl.as_secs()),
                cache_nulls = region.policy().cache_nulls(),
                tier = region.policy().tier().as_str(),
                "Cache region registered"
            );
        }

        Ok(Self { store, regions })
    }

    /// 获取区域，未注册时为配置错误
    pub fn region(&self, name: &str) -> AppResult<&CacheRegion> {
        self.regions.get(name).ok_or_else(|| {
            AppError::configuration(format!("cache region '{}' is not registered", name))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.store.stats()
    }
}
