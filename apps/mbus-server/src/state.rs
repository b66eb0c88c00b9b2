use mbus_acquisition::SupervisorHandle;
use mbus_distribution::DistributionHandle;
use mbus_publish::BroadcastSubscriber;
use mbus_storage::ReadingCache;
use std::sync::Arc;

/// 各 handler 共享的运行时句柄。
#[derive(Clone)]
pub struct AppState {
    pub name: String,
    pub supervisor: Arc<SupervisorHandle>,
    pub distribution: Arc<DistributionHandle>,
    /// 缓存关闭时为空
    pub cache: Option<Arc<ReadingCache>>,
    /// websocket 关闭时为空
    pub live: Option<Arc<BroadcastSubscriber>>,
}
