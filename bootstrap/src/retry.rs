//! 重试工具模块
//!
//! 提供指数退避重试逻辑

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// 重试配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 初始延迟
    pub initial_delay: Duration,
    /// 最大延迟
    pub max_delay: Duration,
    /// 退避乘数
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// 创建新的重试配置
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    /// 设置退避乘数
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// 计算第 n 次重试的延迟
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let capped_delay = (delay_ms as u64).min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped_delay)
    }
}

/// 带重试的异步操作执行器
///
/// 所有尝试都失败时返回最后一次的错误；`max_attempts` 为 0 时按 1 次处理。
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_if(config, operation_name, operation, |_| true).await
}

/// 按错误类型决定是否重试
///
/// `retryable` 返回 false 的错误立即返回，不再等待。
pub async fn with_retry_if<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if !retryable(&e) => {
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    error = %e,
                    "Operation failed with a non-retryable error"
                );
                return Err(e);
            }
            Err(e) if attempt + 1 >= max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %e,
                    "Operation failed, no more retries"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// 带重试的异步操作执行器（可选组件版本）
///
/// 与 `with_retry` 类似，但失败时返回 None 而不是错误
pub async fn with_retry_optional<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match with_retry(config, operation_name, operation).await {
        Ok(result) => Some(result),
        Err(e) => {
            warn!(
                operation = operation_name,
                error = %e,
                "Optional operation failed after all retries, continuing without it"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let config = RetryConfig::new(3, Duration::from_millis(100), Duration::from_secs(1));
        let result: Result<i32, &str> =
            with_retry(&config, "test", || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let config = RetryConfig::new(3, Duration::from_millis(10), Duration::from_millis(100));
        let counter = AtomicU32::new(0);

        let result: Result<i32, &str> = with_retry(&config, "test", || {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err("temporary error")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_all_failures() {
        let config = RetryConfig::new(3, Duration::from_millis(10), Duration::from_millis(100));
        let counter = AtomicU32::new(0);

        let result: Result<i32, &str> = with_retry(&config, "test", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err("permanent error") }
        })
        .await;

        assert_eq!(result.unwrap_err(), "permanent error");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_returns_immediately() {
        let config = RetryConfig::new(5, Duration::from_millis(10), Duration::from_millis(100));
        let counter = AtomicU32::new(0);

        let result: Result<i32, &str> = with_retry_if(
            &config,
            "test",
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("invalid url") }
            },
            |e| !e.starts_with("invalid"),
        )
        .await;

        assert_eq!(result.unwrap_err(), "invalid url");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let config = RetryConfig::new(0, Duration::from_millis(10), Duration::from_millis(100));
        let counter = AtomicU32::new(0);

        let result: Option<i32> = with_retry_optional(&config, "test", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>("down") }
        })
        .await;

        assert!(result.is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::new(5, Duration::from_secs(1), Duration::from_secs(30));

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(16000));
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(30000)); // capped
    }
}
