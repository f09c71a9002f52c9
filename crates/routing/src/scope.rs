//! 路由作用域
//!
//! 标记只在被包裹的 future 被轮询时可见：正常返回、返回错误、panic
//! 或 future 被丢弃，标记都不会留在执行它的工作线程上。
//! 嵌套作用域退出后恢复外层标记。

use std::future::Future;

use dlmp_errors::AppResult;
use tracing::debug;

use crate::marker::{CURRENT_ROUTE, PRIMARY, REPLICA, RouteMarker};
use crate::router::unknown_route;

/// 可校验路由名的路由表
pub trait RouteTable {
    fn is_registered(&self, route: &str) -> bool;
}

/// 路由作用域
#[derive(Clone, Copy)]
pub struct RoutingScope<'r> {
    routes: &'r (dyn RouteTable + Sync),
}

impl<'r> RoutingScope<'r> {
    pub fn new(routes: &'r (dyn RouteTable + Sync)) -> Self {
        Self { routes }
    }

    /// 在指定路由下执行操作
    ///
    /// 路由未注册时返回配置错误，操作不会执行。
    pub async fn run<T, F>(&self, route: &str, operation: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        if !self.routes.is_registered(route) {
            return Err(unknown_route(route));
        }
        debug!(route, "Entering routing scope");
        CURRENT_ROUTE
            .scope(RouteMarker::routed(route), operation)
            .await
    }

    /// 同步版本
    pub fn run_sync<T>(&self, route: &str, operation: impl FnOnce() -> AppResult<T>) -> AppResult<T> {
        if !self.routes.is_registered(route) {
            return Err(unknown_route(route));
        }
        CURRENT_ROUTE.sync_scope(RouteMarker::routed(route), operation)
    }

    /// 主库作用域（写操作）
    pub async fn primary<T, F>(&self, operation: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        self.run(PRIMARY, operation).await
    }

    /// 副本作用域（只读查询、报表）
    pub async fn replica<T, F>(&self, operation: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        self.run(REPLICA, operation).await
    }

    /// 当前任务上的路由标记
    pub fn current() -> RouteMarker {
        RouteMarker::current()
    }

    /// 把当前标记带入即将 spawn 到其他任务的 future
    pub fn propagate<F: Future>(future: F) -> impl Future<Output = F::Output> {
        CURRENT_ROUTE.scope(RouteMarker::current(), future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PoolRegistry;
    use crate::router::DataSourceRouter;
    use dlmp_errors::AppError;

    fn router() -> DataSourceRouter<&'static str> {
        let registry = PoolRegistry::builder()
            .primary("p")
            .replica("rA", "a")
            .build()
            .unwrap();
        DataSourceRouter::new(registry)
    }

    #[tokio::test]
    async fn test_nested_scope_restores_outer() {
        let router = router();
        let scope = router.scope();

        let (inner, outer_after) = scope
            .replica(async {
                let inner = scope
                    .primary(async { Ok(RoutingScope::current()) })
                    .await?;
                Ok::<_, AppError>((inner, RoutingScope::current()))
            })
            .await
            .unwrap();

        assert_eq!(inner.route_name(), PRIMARY);
        assert_eq!(outer_after.route_name(), REPLICA);
        assert_eq!(RoutingScope::current(), RouteMarker::Unrouted);
    }

    #[tokio::test]
    async fn test_unknown_route_does_not_run_operation() {
        let router = router();
        let mut ran = false;

        let result = router
            .scope()
            .run("nonexistent", async {
                ran = true;
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_configuration());
        assert!(!ran);
    }

    #[test]
    fn test_run_sync() {
        let router = router();
        let resolved = router
            .scope()
            .run_sync(REPLICA, || Ok(router.resolve()?.name.to_string()))
            .unwrap();
        assert_eq!(resolved, "rA");

        let failed: AppResult<()> = router
            .scope()
            .run_sync(REPLICA, || Err(AppError::database("boom")));
        assert!(failed.is_err());
        assert_eq!(router.resolve().unwrap().name, PRIMARY);
    }
}
