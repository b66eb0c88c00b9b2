//! 数据库连接管理

use crate::error::PersistError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// 建立 Postgres 连接池。
///
/// 持久化只有一个写入任务，连接数限制为 4。
pub async fn connect_pool(database_url: &str) -> Result<PgPool, PersistError> {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url)
        .await?;
    Ok(pool)
}
