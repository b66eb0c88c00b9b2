//! 追踪、请求 ID 与采集计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub polls: u64,
    pub poll_failures: u64,
    pub readings_good: u64,
    pub readings_error: u64,
    pub retries: u64,
    pub link_down_events: u64,
    pub writes_ok: u64,
    pub writes_failed: u64,
    pub scheduler_restarts: u64,
    pub readings_dispatched: u64,
    /// 入口队列满被挤掉的读数
    pub readings_dropped_ingress: u64,
    /// 各目标队列满被挤掉的读数（每个目标单独计数）
    pub readings_dropped_sink: u64,
    pub persist_failures: u64,
    pub publish_failures: u64,
    pub poll_latency_ms_total: u64,
    pub poll_latency_ms_count: u64,
}

impl MetricsSnapshot {
    /// 平均单设备轮询耗时（毫秒）。
    pub fn avg_poll_latency_ms(&self) -> Option<f64> {
        if self.poll_latency_ms_count == 0 {
            return None;
        }
        Some(self.poll_latency_ms_total as f64 / self.poll_latency_ms_count as f64)
    }
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    polls: AtomicU64,
    poll_failures: AtomicU64,
    readings_good: AtomicU64,
    readings_error: AtomicU64,
    retries: AtomicU64,
    link_down_events: AtomicU64,
    writes_ok: AtomicU64,
    writes_failed: AtomicU64,
    scheduler_restarts: AtomicU64,
    readings_dispatched: AtomicU64,
    readings_dropped_ingress: AtomicU64,
    readings_dropped_sink: AtomicU64,
    persist_failures: AtomicU64,
    publish_failures: AtomicU64,
    poll_latency_ms_total: AtomicU64,
    poll_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            polls: AtomicU64::new(0),
            poll_failures: AtomicU64::new(0),
            readings_good: AtomicU64::new(0),
            readings_error: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            link_down_events: AtomicU64::new(0),
            writes_ok: AtomicU64::new(0),
            writes_failed: AtomicU64::new(0),
            scheduler_restarts: AtomicU64::new(0),
            readings_dispatched: AtomicU64::new(0),
            readings_dropped_ingress: AtomicU64::new(0),
            readings_dropped_sink: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            poll_latency_ms_total: AtomicU64::new(0),
            poll_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            readings_good: self.readings_good.load(Ordering::Relaxed),
            readings_error: self.readings_error.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            link_down_events: self.link_down_events.load(Ordering::Relaxed),
            writes_ok: self.writes_ok.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            scheduler_restarts: self.scheduler_restarts.load(Ordering::Relaxed),
            readings_dispatched: self.readings_dispatched.load(Ordering::Relaxed),
            readings_dropped_ingress: self.readings_dropped_ingress.load(Ordering::Relaxed),
            readings_dropped_sink: self.readings_dropped_sink.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            poll_latency_ms_total: self.poll_latency_ms_total.load(Ordering::Relaxed),
            poll_latency_ms_count: self.poll_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing。`RUST_LOG` 优先，否则使用传入的默认过滤指令。
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录一次设备轮询；`ok == false` 表示本轮至少一个寄存器失败。
pub fn record_poll(ok: bool) {
    let metrics = metrics();
    metrics.polls.fetch_add(1, Ordering::Relaxed);
    if !ok {
        metrics.poll_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录产生的读数。
pub fn record_reading(good: bool) {
    if good {
        metrics().readings_good.fetch_add(1, Ordering::Relaxed);
    } else {
        metrics().readings_error.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_retry() {
    metrics().retries.fetch_add(1, Ordering::Relaxed);
}

/// 记录链路断开（进入退避）。
pub fn record_link_down() {
    metrics().link_down_events.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入命令结果。
pub fn record_write(ok: bool) {
    if ok {
        metrics().writes_ok.fetch_add(1, Ordering::Relaxed);
    } else {
        metrics().writes_failed.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_scheduler_restart() {
    metrics().scheduler_restarts.fetch_add(1, Ordering::Relaxed);
}

/// 记录分发器从入口队列取出的读数。
pub fn record_reading_dispatched() {
    metrics().readings_dispatched.fetch_add(1, Ordering::Relaxed);
}

/// 记录入口队列满时被丢弃的最旧读数。
pub fn record_ingress_drop() {
    metrics().readings_dropped_ingress.fetch_add(1, Ordering::Relaxed);
}

/// 记录某个分发目标队列满时被丢弃的最旧读数。
pub fn record_sink_drop() {
    metrics().readings_dropped_sink.fetch_add(1, Ordering::Relaxed);
}

pub fn record_persist_failure() {
    metrics().persist_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_publish_failure() {
    metrics().publish_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录单设备轮询耗时（毫秒）。
pub fn record_poll_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .poll_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .poll_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
