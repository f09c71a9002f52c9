//! dlmp-adapter-postgres - PostgreSQL 适配器
//!
//! 连接池构建、连接池状态与健康检查。连接池按路由名注册到
//! `dlmp_routing::PoolRegistry`，由路由器在运行期选择。

mod config;
mod connection;
mod health;

pub use config::*;
pub use connection::*;
pub use health::*;
