//! # 读数存储
//!
//! - [`cache`]：最新值缓存，按（设备，寄存器）覆盖写入，读取时按新鲜度标记 `stale`
//! - [`traits`]：持久化接口 [`ReadingSink`]
//! - 实现：
//!   - [`PgReadingSink`]：Postgres 时序表 `readings`
//!   - [`RedisReadingSink`]：Redis 最新值镜像（可选 TTL）
//!   - [`InMemoryReadingSink`] / [`NoopSink`]：测试与未配置持久化时使用
//!
//! 缓存只由分发层的缓存工作任务写入，HTTP 层只读。

pub mod cache;
pub mod connection;
pub mod error;
pub mod in_memory;
pub mod postgres;
pub mod redis;
pub mod traits;

pub use cache::{CacheConfig, ReadingCache};
pub use connection::connect_pool;
pub use error::PersistError;
pub use in_memory::{InMemoryReadingSink, NoopSink};
pub use postgres::PgReadingSink;
pub use redis::RedisReadingSink;
pub use traits::ReadingSink;
