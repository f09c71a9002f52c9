//! dlmp-ports - 抽象 trait 层
//!
//! 定义数据访问层依赖的基础设施接口

mod cache;

pub use cache::*;
