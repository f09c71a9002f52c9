//! PostgreSQL 配置模块

use std::time::Duration;

/// PostgreSQL 连接池配置
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// 数据库 URL
    pub url: String,
    /// 最小连接数
    pub pool_min: u32,
    /// 最大连接数
    pub pool_max: u32,
    /// 获取连接超时
    pub acquire_timeout: Duration,
    /// 空闲超时
    pub idle_timeout: Duration,
    /// 连接最大生命周期
    pub max_lifetime: Option<Duration>,
    /// 应用名称（用于连接标识）
    pub application_name: Option<String>,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_min: 1,
            pool_max: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Some(Duration::from_secs(1800)),
            application_name: None,
        }
    }
}

impl PostgresConfig {
    /// 从 URL 创建配置
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 设置最大连接数，最小连接数不超过最大连接数
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.pool_max = max;
        self.pool_min = self.pool_min.min(max);
        self
    }

    /// 设置连接池配置
    pub fn with_pool(mut self, min: u32, max: u32) -> Self {
        self.pool_min = min;
        self.pool_max = max;
        self
    }

    /// 设置获取连接超时
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// 设置空闲超时
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// 设置连接最大生命周期
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// 设置应用名称
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// 获取带应用名称参数的连接 URL
    pub fn connection_url(&self) -> String {
        match &self.application_name {
            Some(app_name) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}application_name={}", self.url, separator, app_name)
            }
            None => self.url.clone(),
        }
    }
}
