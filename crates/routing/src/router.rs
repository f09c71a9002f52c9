//! 数据源路由器
//!
//! 读取当前任务的路由标记并解析为连接池。未设置标记时使用主库；
//! 副本组在已注册副本之间轮询，首次调用取注册顺序的第一个；
//! 未配置副本时副本组回落到主库。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dlmp_errors::{AppError, AppResult};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::marker::{REPLICA, RouteMarker};
use crate::registry::{NamedPool, PoolDescriptor, PoolRegistry, PoolRole};
use crate::scope::{RouteTable, RoutingScope};

/// 解析结果
#[derive(Debug)]
pub struct ResolvedPool<'a, P> {
    /// 实际使用的连接池名称
    pub name: &'a str,
    pub role: PoolRole,
    pub pool: &'a P,
}

/// 路由统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// 连接池名称 → 解析次数
    pub resolutions: BTreeMap<String, u64>,
}

impl RouterStats {
    pub fn total(&self) -> u64 {
        self.resolutions.values().sum()
    }
}

/// 数据源路由器，进程内共享
#[derive(Debug)]
pub struct DataSourceRouter<P> {
    registry: PoolRegistry<P>,
    cursor: AtomicUsize,
    resolutions: BTreeMap<String, AtomicU64>,
}

impl<P> DataSourceRouter<P> {
    pub fn new(registry: PoolRegistry<P>) -> Self {
        let resolutions = registry
            .iter()
            .map(|pool| (pool.name().to_string(), AtomicU64::new(0)))
            .collect();

        for pool in registry.iter() {
            info!(pool = pool.name(), role = pool.role().as_str(), "Data source registered");
        }
        if !registry.has_replicas() {
            warn!("No replica configured, replica route falls back to primary");
        }

        Self {
            registry,
            cursor: AtomicUsize::new(0),
            resolutions,
        }
    }

    pub fn registry(&self) -> &PoolRegistry<P> {
        &self.registry
    }

    /// 路由作用域
    pub fn scope(&self) -> RoutingScope<'_>
    where
        P: Sync,
    {
        RoutingScope::new(self)
    }

    /// 按当前任务的路由标记解析
    pub fn resolve(&self) -> AppResult<ResolvedPool<'_, P>> {
        self.resolve_for(&RouteMarker::current())
    }

    /// 按指定路由标记解析
    pub fn resolve_for(&self, marker: &RouteMarker) -> AppResult<ResolvedPool<'_, P>> {
        let route = marker.route_name();
        let pool = self.select(route).ok_or_else(|| unknown_route(route))?;

        if let Some(counter) = self.resolutions.get(pool.name()) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        counter!("datasource_route_resolutions_total", "pool" => pool.name().to_string())
            .increment(1);
        debug!(route = %marker, pool = pool.name(), "Data source resolved");

        Ok(ResolvedPool {
            name: pool.name(),
            role: pool.role(),
            pool: pool.pool(),
        })
    }

    fn select(&self, route: &str) -> Option<&NamedPool<P>> {
        if route != REPLICA {
            return self.registry.get(route);
        }

        let replicas = self.registry.replicas();
        if replicas.is_empty() {
            return Some(self.registry.primary());
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % replicas.len();
        replicas.get(index)
    }

    pub fn is_registered(&self, route: &str) -> bool {
        self.registry.is_routable(route)
    }

    /// 启动期校验：调用方会用到的路由名必须全部可解析
    pub fn validate_routes<'r>(&self, routes: impl IntoIterator<Item = &'r str>) -> AppResult<()> {
        for route in routes {
            if !self.is_registered(route) {
                return Err(unknown_route(route));
            }
        }
        Ok(())
    }

    pub fn describe(&self) -> Vec<PoolDescriptor> {
        self.registry.describe()
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            resolutions: self
                .resolutions
                .iter()
                .map(|(name, count)| (name.clone(), count.load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

impl<P> RouteTable for DataSourceRouter<P> {
    fn is_registered(&self, route: &str) -> bool {
        self.registry.is_routable(route)
    }
}

pub(crate) fn unknown_route(route: &str) -> AppError {
    AppError::configuration(format!("data source route '{}' is not registered", route))
}
