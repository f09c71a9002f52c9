//! 连接池注册表

use dlmp_errors::{AppError, AppResult};

use crate::marker::{PRIMARY, REPLICA};

/// 连接池角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolRole {
    /// 主库（写）
    Primary,
    /// 只读副本
    Replica,
}

impl PoolRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Replica => "replica",
        }
    }
}

/// 已注册的连接池
#[derive(Debug, Clone)]
pub struct NamedPool<P> {
    name: String,
    role: PoolRole,
    pool: P,
}

impl<P> NamedPool<P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> PoolRole {
        self.role
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }
}

/// 连接池描述（不含句柄）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDescriptor {
    pub name: String,
    pub role: PoolRole,
}

/// 路由名 → 连接池，启动后只读
///
/// 主库注册为 `primary`；副本按注册顺序保存，既可按各自名称访问，
/// 也可通过副本组 `replica` 轮询访问。名为 `replica` 的副本只能经由副本组访问。
#[derive(Debug, Clone)]
pub struct PoolRegistry<P> {
    primary: NamedPool<P>,
    replicas: Vec<NamedPool<P>>,
}

impl<P> PoolRegistry<P> {
    pub fn builder() -> PoolRegistryBuilder<P> {
        PoolRegistryBuilder::default()
    }

    pub fn primary(&self) -> &NamedPool<P> {
        &self.primary
    }

    /// 按注册顺序排列的副本
    pub fn replicas(&self) -> &[NamedPool<P>] {
        &self.replicas
    }

    pub fn has_replicas(&self) -> bool {
        !self.replicas.is_empty()
    }

    /// 按名称查找单个连接池（不含副本组）
    pub fn get(&self, name: &str) -> Option<&NamedPool<P>> {
        if name == PRIMARY {
            return Some(&self.primary);
        }
        self.replicas.iter().find(|pool| pool.name == name)
    }

    /// 路由名是否可解析（含副本组）
    pub fn is_routable(&self, route: &str) -> bool {
        route == REPLICA || self.get(route).is_some()
    }

    /// 全部连接池，主库在前
    pub fn iter(&self) -> impl Iterator<Item = &NamedPool<P>> {
        std::iter::once(&self.primary).chain(self.replicas.iter())
    }

    pub fn describe(&self) -> Vec<PoolDescriptor> {
        self.iter()
            .map(|pool| PoolDescriptor {
                name: pool.name.clone(),
                role: pool.role,
            })
            .collect()
    }
}

/// 连接池注册表构建器
#[derive(Debug)]
pub struct PoolRegistryBuilder<P> {
    primary: Option<P>,
    replicas: Vec<NamedPool<P>>,
}

impl<P> Default for PoolRegistryBuilder<P> {
    fn default() -> Self {
        Self {
            primary: None,
            replicas: Vec::new(),
        }
    }
}

impl<P> PoolRegistryBuilder<P> {
    /// 设置主库
    pub fn primary(mut self, pool: P) -> Self {
        self.primary = Some(pool);
        self
    }

    /// 追加副本，注册顺序即轮询顺序
    pub fn replica(mut self, name: impl Into<String>, pool: P) -> Self {
        self.replicas.push(NamedPool {
            name: name.into(),
            role: PoolRole::Replica,
            pool,
        });
        self
    }

    pub fn build(self) -> AppResult<PoolRegistry<P>> {
        let pool = self
            .primary
            .ok_or_else(|| AppError::configuration("primary pool is not registered"))?;

        for (index, replica) in self.replicas.iter().enumerate() {
            if replica.name.is_empty() {
                return Err(AppError::configuration("replica pool name is empty"));
            }
            if replica.name == PRIMARY {
                return Err(AppError::configuration(format!(
                    "replica pool name '{}' is reserved",
                    replica.name
                )));
            }
            if self.replicas[..index].iter().any(|other| other.name == replica.name) {
                return Err(AppError::configuration(format!(
                    "replica pool '{}' is registered twice",
                    replica.name
                )));
            }
        }

        Ok(PoolRegistry {
            primary: NamedPool {
                name: PRIMARY.to_string(),
                role: PoolRole::Primary,
                pool,
            },
            replicas: self.replicas,
        })
    }
}
