use async_trait::async_trait;
use domain::{Quality, Reading};
use mbus_distribution::{
    DistributionConfig, Distributor, PublishError, ReadingQueue, ReadingSubscriber, SinkKind,
};
use mbus_storage::{
    CacheConfig, InMemoryReadingSink, PersistError, ReadingCache, ReadingSink,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

fn sample(register: usize) -> Arc<Reading> {
    Arc::new(Reading {
        port: "p1".to_string(),
        device: "meter".to_string(),
        unit_address: 1,
        register: format!("r{}", register),
        ts_ms: 1_000 + register as i64,
        value: Some(register as f64),
        raw: vec![register as u16],
        unit: "V".to_string(),
        quality: Quality::Good,
        error: None,
    })
}

/// 记录收到的寄存器名。
#[derive(Default)]
struct Collecting {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl ReadingSubscriber for Collecting {
    fn id(&self) -> &str {
        "collect"
    }

    async fn publish(&self, reading: &Reading) -> Result<(), PublishError> {
        self.seen.lock().unwrap().push(reading.register.clone());
        Ok(())
    }
}

/// 永不返回的订阅者。
struct Stuck;

#[async_trait]
impl ReadingSubscriber for Stuck {
    fn id(&self) -> &str {
        "stuck"
    }

    async fn publish(&self, _reading: &Reading) -> Result<(), PublishError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// 前 `failures` 次批量写入失败，之后成功。
struct Flaky {
    failures: AtomicUsize,
    attempts: AtomicUsize,
    batches: Mutex<Vec<usize>>,
    inner: InMemoryReadingSink,
}

impl Flaky {
    fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
            inner: InMemoryReadingSink::new(),
        }
    }
}

#[async_trait]
impl ReadingSink for Flaky {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn write(&self, reading: &Reading) -> Result<(), PersistError> {
        self.inner.write(reading).await
    }

    async fn write_batch(&self, readings: &[Arc<Reading>]) -> Result<usize, PersistError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(PersistError::Unavailable("database restarting".to_string()));
        }
        self.batches.lock().unwrap().push(readings.len());
        self.inner.write_batch(readings).await
    }
}

fn config() -> DistributionConfig {
    DistributionConfig {
        cache_queue_size: 100,
        persist_queue_size: 100,
        subscriber_queue_size: 5,
        batch_size: 10,
        max_retries: 3,
        retry_delay: Duration::from_millis(100),
    }
}

#[tokio::test(start_paused = true)]
async fn stuck_subscriber_does_not_block_others() {
    let ingress = Arc::new(ReadingQueue::new(1_000));
    let cache = Arc::new(ReadingCache::new(CacheConfig::default()));
    let collecting = Arc::new(Collecting::default());
    let handle = Distributor::new(config(), ingress.clone())
        .with_cache(cache.clone())
        .with_subscriber(Arc::new(Stuck))
        .with_subscriber(collecting.clone())
        .start();

    for index in 0..50 {
        assert!(!ingress.push(sample(index)));
        sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(collecting.seen.lock().unwrap().len(), 50);
    assert_eq!(cache.len(), 50);

    let stats = handle.stats();
    assert_eq!(stats.dispatched, 50);
    assert_eq!(stats.ingress_dropped, 0);
    let stuck = stats.sink("stuck").unwrap();
    assert_eq!(stuck.kind, SinkKind::Subscriber);
    assert_eq!(stuck.delivered, 0);
    assert_eq!(stuck.dropped, 44);
    assert_eq!(stats.sink("collect").unwrap().delivered, 50);
    assert_eq!(stats.sink("cache").unwrap().dropped, 0);

    let report = handle.shutdown(Duration::from_secs(1)).await;
    assert!(!report.drained);
}

#[tokio::test(start_paused = true)]
async fn persistence_retries_failed_batches() {
    let ingress = Arc::new(ReadingQueue::new(100));
    let sink = Arc::new(Flaky::new(2));
    let handle = Distributor::new(config(), ingress.clone())
        .with_sink(sink.clone())
        .start();

    for index in 0..3 {
        ingress.push(sample(index));
    }
    sleep(Duration::from_secs(1)).await;

    assert_eq!(sink.inner.len(), 3);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    let stats = handle.stats();
    let persisted = stats.sink("flaky").unwrap();
    assert_eq!(persisted.delivered, 3);
    assert_eq!(persisted.failed, 0);

    assert!(handle.shutdown(Duration::from_secs(1)).await.drained);
}

#[tokio::test(start_paused = true)]
async fn persistence_gives_up_after_retry_limit() {
    let ingress = Arc::new(ReadingQueue::new(100));
    let sink = Arc::new(Flaky::new(usize::MAX));
    let mut config = config();
    config.max_retries = 1;
    let handle = Distributor::new(config, ingress.clone())
        .with_sink(sink.clone())
        .start();

    ingress.push(sample(0));
    ingress.push(sample(1));
    sleep(Duration::from_secs(1)).await;

    assert!(sink.inner.is_empty());
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(handle.stats().sink("flaky").unwrap().failed, 2);
    handle.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn persistence_batches_are_bounded() {
    let ingress = Arc::new(ReadingQueue::new(100));
    let sink = Arc::new(Flaky::new(0));
    let mut config = config();
    config.batch_size = 2;
    let handle = Distributor::new(config, ingress.clone())
        .with_sink(sink.clone())
        .start();

    for index in 0..5 {
        ingress.push(sample(index));
    }
    let report = handle.shutdown(Duration::from_secs(1)).await;
    assert!(report.drained);
    assert_eq!(report.pending, 0);

    let batches = sink.batches.lock().unwrap().clone();
    assert!(batches.iter().all(|size| *size <= 2));
    assert_eq!(batches.iter().sum::<usize>(), 5);
    let registers: Vec<String> = sink
        .inner
        .readings()
        .into_iter()
        .map(|reading| reading.register)
        .collect();
    assert_eq!(registers, vec!["r0", "r1", "r2", "r3", "r4"]);
}

#[tokio::test]
async fn shutdown_drains_pending_readings() {
    let ingress = Arc::new(ReadingQueue::new(100));
    let cache = Arc::new(ReadingCache::new(CacheConfig::default()));
    let sink = Arc::new(InMemoryReadingSink::new());
    let handle = Distributor::new(config(), ingress.clone())
        .with_cache(cache.clone())
        .with_sink(sink.clone())
        .start();

    for index in 0..20 {
        ingress.push(sample(index));
    }
    let report = handle.shutdown(Duration::from_secs(5)).await;
    assert!(report.drained);
    assert_eq!(sink.len(), 20);
    assert_eq!(cache.len(), 20);

    // 关闭后采集侧的推入被丢弃
    assert!(ingress.push(sample(99)));
    assert_eq!(handle.shutdown(Duration::from_secs(1)).await.pending, 0);
}
