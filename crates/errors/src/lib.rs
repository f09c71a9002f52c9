//! dlmp-errors - 统一错误处理
//!
//! 数据访问层的错误分类：
//! - 瞬时后端错误（`ExternalService` / `Timeout`）：缓存层内部吸收，不向业务传播
//! - 序列化错误（`Serialization`）：缓存层按瞬时错误处理
//! - 配置错误（`Configuration`）：启动期校验失败或运行期未知路由，必须显式上抛

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// 是否为瞬时后端错误（网络故障、超时）
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ExternalService(_) | Self::Timeout(_))
    }

    /// 是否为配置错误（部署缺陷，而非环境抖动）
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Configuration(_) => 500,
            Self::Internal(_) => 500,
            Self::Database(_) => 500,
            Self::Serialization(_) => 500,
            Self::ExternalService(_) => 502,
            Self::Timeout(_) => 504,
        }
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_is_distinct_from_transient() {
        let config = AppError::configuration("unknown route: nonexistent");
        let transient = AppError::external_service("connection reset");

        assert!(config.is_configuration());
        assert!(!config.is_transient());
        assert!(transient.is_transient());
        assert!(!transient.is_configuration());
    }

    #[test]
    fn test_timeout_is_transient() {
        assert!(AppError::timeout("GET user:1").is_transient());
        assert!(!AppError::serialization("bad json").is_transient());
    }

    #[test]
    fn test_status_code() {
        assert_eq!(AppError::validation("x").status_code(), 400);
        assert_eq!(AppError::configuration("x").status_code(), 500);
        assert_eq!(AppError::external_service("x").status_code(), 502);
        assert_eq!(AppError::timeout("x").status_code(), 504);
    }

    #[test]
    fn test_display() {
        let err = AppError::configuration("route 'nonexistent' is not registered");
        assert_eq!(
            err.to_string(),
            "Configuration error: route 'nonexistent' is not registered"
        );
    }
}
