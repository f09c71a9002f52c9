//! dlmp-routing - 读写分离数据源路由
//!
//! - `RouteMarker`：当前逻辑操作的路由标记，保存在 tokio 任务本地存储中
//! - `PoolRegistry`：路由名 → 连接池句柄，启动后只读
//! - `DataSourceRouter`：按当前标记解析连接池，副本之间轮询
//! - `RoutingScope`：在一次逻辑操作期间设置标记，任何退出路径都会恢复

mod marker;
mod registry;
mod router;
mod scope;

pub use marker::*;
pub use registry::*;
pub use router::*;
pub use scope::*;
