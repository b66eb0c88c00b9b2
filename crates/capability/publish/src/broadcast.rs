use async_trait::async_trait;
use domain::Reading;
use mbus_distribution::{PublishError, ReadingSubscriber};
use std::sync::Arc;
use tokio::sync::broadcast;

/// 进程内广播订阅者。
///
/// 没有接收者时发布直接成功；接收者落后时由 broadcast 通道丢弃最旧消息。
#[derive(Clone)]
pub struct BroadcastSubscriber {
    sender: broadcast::Sender<Arc<Reading>>,
}

impl BroadcastSubscriber {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Reading>> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl ReadingSubscriber for BroadcastSubscriber {
    fn id(&self) -> &str {
        "websocket"
    }

    async fn publish(&self, reading: &Reading) -> Result<(), PublishError> {
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        // 发送期间接收者可能全部断开，此时同样视为成功
        let _ = self.sender.send(Arc::new(reading.clone()));
        Ok(())
    }
}
