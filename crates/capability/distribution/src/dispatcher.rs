use crate::ReadingQueue;
use crate::queue::DropOldestQueue;
use crate::subscriber::ReadingSubscriber;
use domain::Reading;
use mbus_storage::{ReadingCache, ReadingSink};
use mbus_telemetry::{
    record_persist_failure, record_publish_failure, record_reading_dispatched,
    record_sink_drop,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// 分发参数。
#[derive(Debug, Clone)]
pub struct DistributionConfig {
    pub cache_queue_size: usize,
    pub persist_queue_size: usize,
    pub subscriber_queue_size: usize,
    /// 持久化单批最大条数
    pub batch_size: usize,
    /// 单批写入失败后的最大重试次数
    pub max_retries: usize,
    pub retry_delay: Duration,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            cache_queue_size: 1_000,
            persist_queue_size: 10_000,
            subscriber_queue_size: 1_000,
            batch_size: 100,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl DistributionConfig {
    fn sanitized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        if self.persist_queue_size < self.batch_size {
            self.persist_queue_size = self.batch_size;
        }
        self.cache_queue_size = self.cache_queue_size.max(1);
        self.subscriber_queue_size = self.subscriber_queue_size.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Cache,
    Persistence,
    Subscriber,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Persistence => "persistence",
            Self::Subscriber => "subscriber",
        }
    }
}

/// 单个分发目标的统计快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkStats {
    pub name: String,
    pub kind: SinkKind,
    pub pending: usize,
    pub delivered: u64,
    pub dropped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionStats {
    pub ingress_pending: usize,
    pub ingress_dropped: u64,
    pub dispatched: u64,
    pub sinks: Vec<SinkStats>,
}

impl DistributionStats {
    pub fn sink(&self, name: &str) -> Option<&SinkStats> {
        self.sinks.iter().find(|sink| sink.name == name)
    }
}

/// 停止结果：`drained` 为 false 表示宽限期内未处理完，剩余任务已中止。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub drained: bool,
    pub pending: usize,
}

struct SinkSlot {
    name: String,
    kind: SinkKind,
    queue: DropOldestQueue<Arc<Reading>>,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl SinkSlot {
    fn new(name: impl Into<String>, kind: SinkKind, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            queue: DropOldestQueue::new(capacity),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    fn stats(&self) -> SinkStats {
        SinkStats {
            name: self.name.clone(),
            kind: self.kind,
            pending: self.queue.len(),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.queue.dropped(),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// 分发拓扑的构建器。
pub struct Distributor {
    config: DistributionConfig,
    ingress: Arc<ReadingQueue>,
    cache: Option<Arc<ReadingCache>>,
    sink: Option<Arc<dyn ReadingSink>>,
    subscribers: Vec<Arc<dyn ReadingSubscriber>>,
}

impl Distributor {
    pub fn new(config: DistributionConfig, ingress: Arc<ReadingQueue>) -> Self {
        Self {
            config: config.sanitized(),
            ingress,
            cache: None,
            sink: None,
            subscribers: Vec::new(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ReadingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReadingSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn ReadingSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// 启动分发任务与各目标的工作任务。
    pub fn start(self) -> DistributionHandle {
        let config = self.config;
        let mut tasks = JoinSet::new();
        let mut slots = Vec::new();

        if let Some(cache) = self.cache {
            let slot = SinkSlot::new("cache", SinkKind::Cache, config.cache_queue_size);
            tasks.spawn(cache_worker(slot.clone(), cache));
            slots.push(slot);
        }
        if let Some(sink) = self.sink {
            let slot = SinkSlot::new(
                sink.name(),
                SinkKind::Persistence,
                config.persist_queue_size,
            );
            tasks.spawn(persist_worker(slot.clone(), sink, config.clone()));
            slots.push(slot);
        }
        for subscriber in self.subscribers {
            let slot = SinkSlot::new(
                subscriber.id(),
                SinkKind::Subscriber,
                config.subscriber_queue_size,
            );
            tasks.spawn(subscriber_worker(slot.clone(), subscriber));
            slots.push(slot);
        }

        let dispatched = Arc::new(AtomicU64::new(0));
        tasks.spawn(dispatch(self.ingress.clone(), slots.clone(), dispatched.clone()));
        info!(
            target: "mbus.distribution",
            sinks = slots.len(),
            "distribution started"
        );

        DistributionHandle {
            ingress: self.ingress,
            slots,
            dispatched,
            tasks: Mutex::new(tasks),
        }
    }
}

pub struct DistributionHandle {
    ingress: Arc<ReadingQueue>,
    slots: Vec<Arc<SinkSlot>>,
    dispatched: Arc<AtomicU64>,
    tasks: Mutex<JoinSet<()>>,
}

impl DistributionHandle {
    pub fn stats(&self) -> DistributionStats {
        DistributionStats {
            ingress_pending: self.ingress.len(),
            ingress_dropped: self.ingress.dropped(),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            sinks: self.slots.iter().map(|slot| slot.stats()).collect(),
        }
    }

    /// 关闭入口队列，在宽限期内处理完已入队的读数；超时则中止剩余任务。
    ///
    /// 应在采集停止之后调用。重复调用直接返回。
    pub async fn shutdown(&self, grace: Duration) -> DrainReport {
        self.ingress.close();
        let mut tasks = self.tasks.lock().await;
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(err) = result
                    && err.is_panic()
                {
                    warn!(target: "mbus.distribution", "distribution task panicked");
                }
            }
        })
        .await
        .is_ok();
        if !drained {
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        let pending = self.ingress.len()
            + self
                .slots
                .iter()
                .map(|slot| slot.queue.len())
                .sum::<usize>();
        info!(
            target: "mbus.distribution",
            drained,
            pending,
            "distribution stopped"
        );
        DrainReport { drained, pending }
    }
}

async fn dispatch(
    ingress: Arc<ReadingQueue>,
    slots: Vec<Arc<SinkSlot>>,
    dispatched: Arc<AtomicU64>,
) {
    while let Some(reading) = ingress.pop().await {
        for slot in &slots {
            if slot.queue.push(reading.clone()) {
                record_sink_drop();
                debug!(
                    target: "mbus.distribution",
                    sink = %slot.name,
                    device = %reading.device,
                    "sink queue full, dropped oldest reading"
                );
            }
        }
        dispatched.fetch_add(1, Ordering::Relaxed);
        record_reading_dispatched();
    }
    for slot in &slots {
        slot.queue.close();
    }
}

async fn cache_worker(slot: Arc<SinkSlot>, cache: Arc<ReadingCache>) {
    while let Some(reading) = slot.queue.pop().await {
        cache.update(reading);
        slot.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

async fn persist_worker(
    slot: Arc<SinkSlot>,
    sink: Arc<dyn ReadingSink>,
    config: DistributionConfig,
) {
    while let Some(first) = slot.queue.pop().await {
        let mut batch = Vec::with_capacity(config.batch_size);
        batch.push(first);
        batch.extend(slot.queue.drain_up_to(config.batch_size - 1));

        let mut attempt = 0;
        loop {
            match sink.write_batch(&batch).await {
                Ok(written) => {
                    slot.delivered.fetch_add(written as u64, Ordering::Relaxed);
                    break;
                }
                Err(err) => {
                    attempt += 1;
                    if attempt > config.max_retries {
                        slot.failed.fetch_add(batch.len() as u64, Ordering::Relaxed);
                        record_persist_failure();
                        warn!(
                            target: "mbus.distribution",
                            sink = %slot.name,
                            batch = batch.len(),
                            error = %err,
                            "persist batch dropped after retries"
                        );
                        break;
                    }
                    debug!(
                        target: "mbus.distribution",
                        sink = %slot.name,
                        attempt,
                        error = %err,
                        "persist batch failed, retrying"
                    );
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }
}

async fn subscriber_worker(slot: Arc<SinkSlot>, subscriber: Arc<dyn ReadingSubscriber>) {
    while let Some(reading) = slot.queue.pop().await {
        match subscriber.publish(&reading).await {
            Ok(()) => {
                slot.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                slot.failed.fetch_add(1, Ordering::Relaxed);
                record_publish_failure();
                debug!(
                    target: "mbus.distribution",
                    subscriber = %slot.name,
                    error = %err,
                    "publish failed"
                );
            }
        }
    }
}
