use async_trait::async_trait;
use domain::Reading;

/// 订阅者发布失败。只计数，不影响采集。
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    #[error("subscriber closed: {0}")]
    Closed(String),
    #[error("publish transport error: {0}")]
    Transport(String),
    #[error("serialize error: {0}")]
    Serialize(String),
}

/// 实时读数订阅者。
///
/// 每个订阅者有独立的队列与工作任务，`publish` 阻塞只影响自己。
#[async_trait]
pub trait ReadingSubscriber: Send + Sync {
    fn id(&self) -> &str;

    async fn publish(&self, reading: &Reading) -> Result<(), PublishError>;
}
