//! Redis 健康检查模块

use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::connection::{RedisConnection, check_connection};

/// 健康检查结果
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// 是否健康
    pub healthy: bool,
    /// 延迟（毫秒）
    pub latency_ms: Option<u64>,
    /// 错误信息
    pub error: Option<String>,
}

/// 健康检查器
#[derive(Debug, Clone)]
pub struct HealthChecker {
    conn: RedisConnection,
    timeout: Duration,
}

impl HealthChecker {
    /// 创建新的健康检查器
    pub fn new(conn: RedisConnection) -> Self {
        Self {
            conn,
            timeout: Duration::from_secs(5),
        }
    }

    /// 设置超时时间
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 执行健康检查
    pub async fn check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let mut conn = self.conn.clone();

        match tokio::time::timeout(self.timeout, check_connection(&mut conn)).await {
            Ok(Ok(())) => {
                let latency = start.elapsed().as_millis() as u64;
                debug!(latency_ms = latency, "Redis health check passed");
                HealthCheckResult {
                    healthy: true,
                    latency_ms: Some(latency),
                    error: None,
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Redis health check failed");
                HealthCheckResult {
                    healthy: false,
                    latency_ms: None,
                    error: Some(e.to_string()),
                }
            }
            Err(_) => {
                error!("Redis health check timed out");
                HealthCheckResult {
                    healthy: false,
                    latency_ms: None,
                    error: Some("Health check timed out".to_string()),
                }
            }
        }
    }
}
