//! dlmp-bootstrap - 数据访问层启动装配
//!
//! 按配置创建缓存后端、区域注册表、限流器、连接池与数据源路由器，
//! 并在启动期完成策略与路由校验。

mod health;
mod infrastructure;
mod retry;
mod runtime;

pub use health::*;
pub use infrastructure::*;
pub use retry::*;
pub use runtime::*;
