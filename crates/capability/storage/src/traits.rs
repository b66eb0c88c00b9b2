//! 持久化接口

use crate::error::PersistError;
use async_trait::async_trait;
use domain::Reading;
use std::sync::Arc;

/// 读数持久化目标。
///
/// 实现只负责单次写入；重试、批量与失败计数由分发层的持久化工作任务负责。
#[async_trait]
pub trait ReadingSink: Send + Sync {
    /// 用于日志与统计的名字
    fn name(&self) -> &'static str;

    async fn write(&self, reading: &Reading) -> Result<(), PersistError>;

    /// 批量写入，返回写入条数。默认逐条写入，遇错即止。
    async fn write_batch(&self, readings: &[Arc<Reading>]) -> Result<usize, PersistError> {
        for reading in readings {
            self.write(reading).await?;
        }
        Ok(readings.len())
    }
}
