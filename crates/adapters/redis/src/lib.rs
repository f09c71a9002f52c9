//! dlmp-adapter-redis - Redis 适配器

mod cache;
mod config;
mod connection;
mod health;
mod lazy;

pub use cache::*;
pub use config::*;
pub use connection::*;
pub use health::*;
pub use lazy::*;
