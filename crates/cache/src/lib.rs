//! dlmp-cache - 多区域缓存管理
//!
//! - `CacheKey`：`region:localKey` 规范键
//! - `CacheStore`：对 `CachePort` 的降级封装，后端故障只记录不传播
//! - `RegionPolicyTable` / `CacheRegion` / `CacheRegistry`：按区域的 TTL 策略与门面
//! - `RateLimiter`：基于原子计数的固定窗口限流
//! - `MemoryCache`：进程内 `CachePort` 实现（开发、测试环境）

mod facades;
mod key;
mod memory;
mod outcome;
mod policy;
mod rate_limiter;
mod region;
mod registry;
mod stats;
mod store;

pub use facades::*;
pub use key::*;
pub use memory::*;
pub use outcome::*;
pub use policy::*;
pub use rate_limiter::*;
pub use region::*;
pub use registry::*;
pub use stats::*;
pub use store::*;
