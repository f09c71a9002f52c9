//! 路由标记

use std::fmt;

/// 主库路由名
pub const PRIMARY: &str = "primary";
/// 副本组路由名，在已注册的副本之间轮询
pub const REPLICA: &str = "replica";

tokio::task_local! {
    pub(crate) static CURRENT_ROUTE: RouteMarker;
}

/// 当前逻辑操作的路由标记，未设置时使用主库
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum RouteMarker {
    #[default]
    Unrouted,
    Routed(String),
}

impl RouteMarker {
    pub fn routed(route: impl Into<String>) -> Self {
        Self::Routed(route.into())
    }

    /// 实际生效的路由名
    pub fn route_name(&self) -> &str {
        match self {
            Self::Unrouted => PRIMARY,
            Self::Routed(route) => route,
        }
    }

    pub fn is_routed(&self) -> bool {
        matches!(self, Self::Routed(_))
    }

    /// 当前任务上的标记
    pub fn current() -> Self {
        CURRENT_ROUTE
            .try_with(|marker| marker.clone())
            .unwrap_or_default()
    }
}

impl fmt::Display for RouteMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrouted => write!(f, "unrouted"),
            Self::Routed(route) => write!(f, "{}", route),
        }
    }
}

/// 显式路由上下文，随调用链传递而不依赖任务本地存储
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteContext {
    marker: RouteMarker,
}

impl RouteContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从当前任务的标记创建
    pub fn capture() -> Self {
        Self {
            marker: RouteMarker::current(),
        }
    }

    /// 返回指向另一路由的新上下文，原上下文不变
    pub fn with_route(&self, route: impl Into<String>) -> Self {
        Self {
            marker: RouteMarker::routed(route),
        }
    }

    pub fn primary(&self) -> Self {
        self.with_route(PRIMARY)
    }

    pub fn replica(&self) -> Self {
        self.with_route(REPLICA)
    }

    pub fn marker(&self) -> &RouteMarker {
        &self.marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrouted_means_primary() {
        assert_eq!(RouteMarker::Unrouted.route_name(), PRIMARY);
        assert_eq!(RouteMarker::current(), RouteMarker::Unrouted);
    }

    #[test]
    fn test_context_is_immutable() {
        let root = RouteContext::new();
        let read = root.replica();

        assert_eq!(root.marker(), &RouteMarker::Unrouted);
        assert_eq!(read.marker().route_name(), REPLICA);
        assert_eq!(read.primary().marker().route_name(), PRIMARY);
    }

    #[tokio::test]
    async fn test_capture_reads_task_local() {
        let captured = CURRENT_ROUTE
            .scope(RouteMarker::routed(REPLICA), async { RouteContext::capture() })
            .await;
        assert_eq!(captured.marker().route_name(), REPLICA);
        assert_eq!(RouteContext::capture().marker(), &RouteMarker::Unrouted);
    }
}
