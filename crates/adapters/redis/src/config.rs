//! Redis 配置模块

use std::time::Duration;

/// Redis 部署模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedisMode {
    /// 单机模式
    #[default]
    Standalone,
    /// 集群模式
    Cluster,
}

/// Redis 配置
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL（单机模式）
    pub url: String,
    /// 部署模式
    pub mode: RedisMode,
    /// 集群节点地址
    pub cluster_nodes: Vec<String>,
    /// 连接超时
    pub connection_timeout: Duration,
    /// 键前缀（命名空间）
    pub key_prefix: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            mode: RedisMode::default(),
            cluster_nodes: Vec::new(),
            connection_timeout: Duration::from_secs(10),
            key_prefix: None,
        }
    }
}

impl RedisConfig {
    /// 创建新的配置
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 设置连接超时
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// 设置集群模式
    pub fn with_cluster(mut self, nodes: Vec<String>) -> Self {
        self.mode = RedisMode::Cluster;
        self.cluster_nodes = nodes;
        self
    }

    /// 设置键前缀，空字符串表示不加前缀
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.key_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// 是否为集群模式
    pub fn is_cluster(&self) -> bool {
        self.mode == RedisMode::Cluster
    }
}

/// 键前缀
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPrefix(Option<String>);

impl KeyPrefix {
    pub fn new(prefix: Option<String>) -> Self {
        Self(prefix)
    }

    /// 获取带前缀的键（同样适用于 glob 模式）
    pub fn apply(&self, key: &str) -> String {
        match &self.0 {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}
