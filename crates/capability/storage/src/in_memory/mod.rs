//! 内存实现（测试与未配置持久化时使用）

mod readings;

pub use readings::{InMemoryReadingSink, NoopSink};
