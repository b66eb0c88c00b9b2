//! 持久化错误类型

/// 持久化失败。分发层计数并重试，从不向采集侧传播。
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("database error: {0}")]
    Database(String),
    #[error("redis error: {0}")]
    Redis(String),
    #[error("serialize error: {0}")]
    Serialize(String),
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for PersistError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<::redis::RedisError> for PersistError {
    fn from(err: ::redis::RedisError) -> Self {
        Self::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}
