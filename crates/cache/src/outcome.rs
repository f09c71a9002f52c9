//! 缓存操作结果

use dlmp_errors::AppError;

/// 被吸收的后端故障类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheFailure {
    /// 网络、连接或命令错误
    Backend,
    /// 超过命令超时
    Timeout,
    /// 值无法编码或解码
    Serialization,
}

impl CacheFailure {
    pub fn from_error(err: &AppError) -> Self {
        match err {
            AppError::Timeout(_) => Self::Timeout,
            AppError::Serialization(_) => Self::Serialization,
            _ => Self::Backend,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backend => "backend_error",
            Self::Timeout => "timeout",
            Self::Serialization => "serialization_error",
        }
    }
}

/// 降级查询结果
///
/// 业务路径只关心 `into_option()`，"未命中" 与 "后端不可用" 对其等价；
/// 需要区分二者时（日志、限流、监控）直接匹配变体。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Absent,
    Unavailable(CacheFailure),
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Absent | Self::Unavailable(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn failure(&self) -> Option<CacheFailure> {
        match self {
            Self::Unavailable(failure) => Some(*failure),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::Absent => Lookup::Absent,
            Self::Unavailable(failure) => Lookup::Unavailable(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            CacheFailure::from_error(&AppError::timeout("GET")),
            CacheFailure::Timeout
        );
        assert_eq!(
            CacheFailure::from_error(&AppError::serialization("eof")),
            CacheFailure::Serialization
        );
        assert_eq!(
            CacheFailure::from_error(&AppError::external_service("reset")),
            CacheFailure::Backend
        );
    }

    #[test]
    fn test_lookup_collapses_to_option() {
        assert_eq!(Lookup::Found(3).into_option(), Some(3));
        assert_eq!(Lookup::<i32>::Absent.into_option(), None);

        let unavailable = Lookup::<i32>::Unavailable(CacheFailure::Timeout);
        assert!(unavailable.is_unavailable());
        assert_eq!(unavailable.failure(), Some(CacheFailure::Timeout));
        assert_eq!(unavailable.into_option(), None);
    }

    #[test]
    fn test_lookup_map() {
        assert_eq!(Lookup::Found(2).map(|v| v * 10), Lookup::Found(20));
        assert_eq!(Lookup::<i32>::Absent.map(|v| v * 10), Lookup::Absent);
    }
}
