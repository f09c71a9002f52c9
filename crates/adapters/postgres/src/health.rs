//! PostgreSQL 健康检查模块
//!
//! 对注册表中的每个连接池执行 `SELECT 1`，并报告连接池状态

use std::time::{Duration, Instant};

use dlmp_routing::{PoolRegistry, PoolRole};
use futures::future::join_all;
use sqlx::PgPool;
use tracing::{debug, error};

use crate::connection::check_connection;

/// 连接池状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// 连接池大小
    pub size: u32,
    /// 空闲连接数
    pub idle: u32,
    /// 活跃连接数
    pub active: u32,
}

impl PoolStatus {
    pub fn of(pool: &PgPool) -> Self {
        Self::from_counts(pool.size(), pool.num_idle() as u32)
    }

    fn from_counts(size: u32, idle: u32) -> Self {
        Self {
            size,
            idle,
            active: size.saturating_sub(idle),
        }
    }
}

/// 单个连接池的健康检查结果
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// 连接池名称
    pub name: String,
    pub role: PoolRole,
    /// 是否健康
    pub healthy: bool,
    /// 延迟（毫秒）
    pub latency_ms: Option<u64>,
    /// 错误信息
    pub error: Option<String>,
    /// 连接池状态
    pub pool_status: PoolStatus,
}

/// 健康检查器
#[derive(Debug, Clone)]
pub struct HealthChecker {
    timeout: Duration,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置超时时间
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 检查单个连接池
    pub async fn check(&self, name: &str, role: PoolRole, pool: &PgPool) -> HealthCheckResult {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, check_connection(pool)).await;

        let (healthy, latency_ms, error) = match result {
            Ok(Ok(())) => {
                let latency = start.elapsed().as_millis() as u64;
                debug!(pool = name, latency_ms = latency, "PostgreSQL health check passed");
                (true, Some(latency), None)
            }
            Ok(Err(e)) => {
                error!(pool = name, error = %e, "PostgreSQL health check failed");
                (false, None, Some(e.to_string()))
            }
            Err(_) => {
                error!(pool = name, "PostgreSQL health check timed out");
                (false, None, Some("Health check timed out".to_string()))
            }
        };

        HealthCheckResult {
            name: name.to_string(),
            role,
            healthy,
            latency_ms,
            error,
            pool_status: PoolStatus::of(pool),
        }
    }

    /// 并发检查注册表中的全部连接池，主库在前
    pub async fn check_registry(&self, registry: &PoolRegistry<PgPool>) -> Vec<HealthCheckResult> {
        join_all(
            registry
                .iter()
                .map(|pool| self.check(pool.name(), pool.role(), pool.pool())),
        )
        .await
    }
}
