//! Modbus 采集服务器入口：加载配置，启动采集与分发，提供 HTTP / websocket 接口。
//!
//! 停机顺序：Ctrl-C → HTTP 停止接收 → 采集停机 → 分发在 `drain_timeout` 内清空队列。

use domain::PortConfig;
use mbus_acquisition::{AcquisitionSupervisor, BackoffPolicy, SupervisorConfig};
use mbus_config::{AppConfig, PersistenceBackend};
use mbus_distribution::{DistributionConfig, Distributor, ReadingQueue};
use mbus_protocol::ModbusTransportFactory;
use mbus_publish::{BroadcastSubscriber, MqttPublisherConfig, MqttSubscriber};
use mbus_server::{AppState, create_router};
use mbus_storage::{
    CacheConfig, InMemoryReadingSink, PgReadingSink, ReadingCache, ReadingSink, RedisReadingSink,
};
use mbus_telemetry::init_tracing;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;
    init_tracing(&config.logging.level);
    for warning in &config.warnings {
        warn!(target: "mbus.config", path = %config.source.display(), "{}", warning);
    }

    let ingress = Arc::new(ReadingQueue::new(config.polling.reading_queue_size));
    let cache = config.cache.enabled.then(|| {
        Arc::new(ReadingCache::new(CacheConfig {
            max_entries: config.cache.max_entries,
            stale_after: config.cache.stale_after,
        }))
    });
    let live = config
        .websocket
        .enabled
        .then(|| Arc::new(BroadcastSubscriber::new(config.websocket.buffer)));

    let mut distributor = Distributor::new(distribution_config(&config), ingress.clone());
    if let Some(cache) = &cache {
        distributor = distributor.with_cache(cache.clone());
    }
    if let Some(sink) = persistence_sink(&config).await? {
        info!(target: "mbus.distribution", sink = sink.name(), "persistence enabled");
        distributor = distributor.with_sink(sink);
    }
    if let Some(live) = &live {
        distributor = distributor.with_subscriber(live.clone());
    }
    let mut mqtt_task = None;
    if config.mqtt.enabled {
        let (subscriber, task) = MqttSubscriber::connect(MqttPublisherConfig {
            host: config.mqtt.host.clone(),
            port: config.mqtt.port,
            username: config.mqtt.username.clone(),
            password: config.mqtt.password.clone(),
            topic_prefix: config.mqtt.topic_prefix.clone(),
            qos: config.mqtt.qos,
            retain: config.mqtt.retain,
        });
        distributor = distributor.with_subscriber(Arc::new(subscriber));
        mqtt_task = Some(task);
    }
    let distribution = Arc::new(distributor.start());

    let ports: Vec<Arc<PortConfig>> = config.ports.iter().cloned().map(Arc::new).collect();
    let supervisor = AcquisitionSupervisor::new(
        ports,
        Arc::new(ModbusTransportFactory),
        ingress,
        SupervisorConfig {
            backoff: BackoffPolicy::new(config.polling.backoff_floor, config.polling.backoff_ceiling),
            restart_delay: config.polling.restart_delay,
            shutdown_grace: config.polling.shutdown_grace,
            command_buffer: config.polling.command_buffer,
        },
    )?;
    let supervisor = Arc::new(supervisor.start());

    let app = create_router(AppState {
        name: config.server.name.clone(),
        supervisor: supervisor.clone(),
        distribution: distribution.clone(),
        cache,
        live,
    });
    let listener = tokio::net::TcpListener::bind(&config.server.http_addr).await?;
    info!(
        target: "mbus.api",
        addr = %config.server.http_addr,
        ports = config.ports.len(),
        "server listening"
    );
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let report = supervisor.shutdown().await;
    info!(
        target: "mbus.acquisition",
        stopped = report.stopped.len(),
        aborted = ?report.aborted,
        fatal = ?report.fatal,
        "acquisition stopped"
    );
    let drain = distribution
        .shutdown(config.distribution.drain_timeout)
        .await;
    if !drain.drained {
        warn!(
            target: "mbus.distribution",
            pending = drain.pending,
            "readings discarded at shutdown"
        );
    }
    if let Some(task) = mqtt_task {
        task.abort();
    }
    served?;
    Ok(())
}

fn distribution_config(config: &AppConfig) -> DistributionConfig {
    let settings = &config.distribution;
    DistributionConfig {
        cache_queue_size: settings.cache_queue_size,
        persist_queue_size: settings.persist_queue_size,
        subscriber_queue_size: settings.subscriber_queue_size,
        batch_size: settings.batch_size,
        max_retries: settings.max_retries,
        retry_delay: settings.retry_delay,
    }
}

/// 按配置的后端构造持久化目标；缺少连接串时启动失败。
async fn persistence_sink(
    config: &AppConfig,
) -> Result<Option<Arc<dyn ReadingSink>>, Box<dyn std::error::Error>> {
    let settings = &config.persistence;
    let sink: Arc<dyn ReadingSink> = match settings.backend {
        PersistenceBackend::None => return Ok(None),
        PersistenceBackend::Memory => Arc::new(InMemoryReadingSink::new()),
        PersistenceBackend::Postgres => {
            let url = settings
                .database_url
                .as_deref()
                .ok_or("persistence backend postgres requires database_url or MBUS_DATABASE_URL")?;
            let sink = PgReadingSink::connect(url).await?;
            sink.ensure_schema().await?;
            Arc::new(sink)
        }
        PersistenceBackend::Redis => {
            let url = settings
                .redis_url
                .as_deref()
                .ok_or("persistence backend redis requires redis_url or MBUS_REDIS_URL")?;
            Arc::new(RedisReadingSink::connect(url, settings.redis_ttl_seconds)?)
        }
    };
    Ok(Some(sink))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target: "mbus.api", error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!(target: "mbus.api", "shutdown requested");
}
