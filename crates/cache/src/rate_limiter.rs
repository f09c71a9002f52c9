//! 限流器模块
//!
//! 固定窗口计数：原子递增，计数从无到 1 时设置窗口过期时间，
//! 窗口只在后端自然过期后重新开始。跨窗口边界最多放行 `2 × max_requests`。

use std::collections::BTreeMap;
use std::time::Duration;

use dlmp_errors::{AppError, AppResult};
use metrics::counter;
use tracing::{debug, warn};

use crate::key::compose;
use crate::outcome::Lookup;
use crate::region::CacheRegion;

/// 限流规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    max_requests: u64,
    window: Duration,
}

impl RateLimitRule {
    /// 创建规则，配额与窗口都必须大于 0
    pub fn new(max_requests: u64, window: Duration) -> AppResult<Self> {
        if max_requests == 0 {
            return Err(AppError::configuration(
                "rate limit max_requests must be greater than 0",
            ));
        }
        if window.is_zero() {
            return Err(AppError::configuration(
                "rate limit window must be greater than 0",
            ));
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// 限流结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// 是否允许
    pub allowed: bool,
    /// 递增后的计数，后端不可用时为 None
    pub count: Option<i64>,
    /// 总配额
    pub limit: u64,
}

impl RateLimitDecision {
    /// 是否被限流
    pub fn is_limited(&self) -> bool {
        !self.allowed
    }

    /// 当前窗口剩余配额
    pub fn remaining(&self) -> u64 {
        match self.count {
            Some(count) => self.limit.saturating_sub(count.max(0) as u64),
            None => self.limit,
        }
    }
}

/// 固定窗口限流器
#[derive(Debug, Clone)]
pub struct RateLimiter {
    region: CacheRegion,
    rules: BTreeMap<String, RateLimitRule>,
}

impl RateLimiter {
    /// 基于限流区域创建
    pub fn new(region: CacheRegion) -> Self {
        Self {
            region,
            rules: BTreeMap::new(),
        }
    }

    /// 注册命名规则
    pub fn with_rule(mut self, name: impl Into<String>, rule: RateLimitRule) -> Self {
        self.rules.insert(name.into(), rule);
        self
    }

    /// 批量注册命名规则
    pub fn with_rules(
        mut self,
        rules: impl IntoIterator<Item = (String, RateLimitRule)>,
    ) -> Self {
        self.rules.extend(rules);
        self
    }

    /// 获取命名规则，未注册时为配置错误
    pub fn rule(&self, name: &str) -> AppResult<RateLimitRule> {
        self.rules.get(name).copied().ok_or_else(|| {
            AppError::configuration(format!("rate limit rule '{}' is not configured", name))
        })
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, &RateLimitRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    /// 检查并消费配额
    ///
    /// 后端不可用时放行。窗口为 0 时计数立即过期，每次调用都是新窗口。
    pub async fn check(&self, key: &str, max_requests: u64, window: Duration) -> RateLimitDecision {
        let count = match self.region.increment(key, 1).await {
            Lookup::Found(count) => count,
            Lookup::Absent => 0,
            Lookup::Unavailable(failure) => {
                warn!(
                    key = %key,
                    outcome = failure.as_str(),
                    "Rate limit counter unavailable, allowing request"
                );
                record_decision(true);
                return RateLimitDecision {
                    allowed: true,
                    count: None,
                    limit: max_requests,
                };
            }
        };

        if count == 1 && !self.region.expire(key, window).await {
            warn!(
                key = %key,
                window_ms = window.as_millis() as u64,
                "Rate limit window expiry not set, counter will not reset on its own"
            );
        }

        let allowed = count <= i64::try_from(max_requests).unwrap_or(i64::MAX);
        record_decision(allowed);
        debug!(
            key = %key,
            count,
            limit = max_requests,
            allowed,
            "Fixed window rate limit check"
        );

        RateLimitDecision {
            allowed,
            count: Some(count),
            limit: max_requests,
        }
    }

    /// 是否允许本次请求
    pub async fn is_allowed(&self, key: &str, max_requests: u64, window: Duration) -> bool {
        self.check(key, max_requests, window).await.allowed
    }

    /// 按命名规则检查，计数键为 `rule:subject`
    pub async fn check_rule(&self, rule: &str, subject: &str) -> AppResult<RateLimitDecision> {
        let limits = self.rule(rule)?;
        Ok(self
            .check(
                &compose(&[rule, subject]),
                limits.max_requests(),
                limits.window(),
            )
            .await)
    }

    /// 当前窗口计数，不消费配额
    pub async fn current_count(&self, key: &str) -> i64 {
        self.region.get_entity::<i64>(key).await.unwrap_or(0)
    }

    /// 当前窗口剩余时间
    pub async fn remaining_time(&self, key: &str) -> Option<Duration> {
        self.region.ttl(key).await
    }

    pub fn region(&self) -> &CacheRegion {
        &self.region
    }
}

fn record_decision(allowed: bool) {
    let allowed = if allowed { "true" } else { "false" };
    counter!("rate_limit_decisions_total", "allowed" => allowed).increment(1);
}
