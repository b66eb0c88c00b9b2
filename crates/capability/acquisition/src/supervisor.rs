//! 采集监督器：每个启用端口一个运行器任务，负责重启、停机与状态汇总。

use crate::backoff::BackoffPolicy;
use crate::scheduler::{PortScheduler, SchedulerError};
use crate::shutdown::{Shutdown, ShutdownTrigger, shutdown_channel};
use crate::write::{PortCommand, WriteCommand, WriteError};
use domain::{LinkHealth, LinkState, PortConfig};
use mbus_distribution::ReadingQueue;
use mbus_protocol::TransportFactory;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

/// 写入在命令超时之外额外等待的时间（排在进行中的一次设备轮询之后）。
const WRITE_QUEUE_MARGIN: Duration = Duration::from_secs(5);

/// 监督器参数。
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub backoff: BackoffPolicy,
    /// 调度器 panic 或意外结束后的重启间隔
    pub restart_delay: Duration,
    /// 停机时等待调度器退出的时间
    pub shutdown_grace: Duration,
    /// 每个端口的写入命令缓冲
    pub command_buffer: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            restart_delay: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(5),
            command_buffer: 16,
        }
    }
}

/// 监督器错误。
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("duplicate port name: {0}")]
    DuplicatePort(String),
}

/// 停机报告。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// 在宽限期内正常退出的端口
    pub stopped: Vec<String>,
    /// 宽限期后被强制终止的端口
    pub aborted: Vec<String>,
    /// 因链路构造失败而停止的端口
    pub fatal: Vec<String>,
}

#[derive(Debug)]
enum PortExit {
    Stopped(String),
    Fatal(String),
}

struct PortEntry {
    config: Arc<PortConfig>,
    commands: Option<mpsc::Sender<PortCommand>>,
    health: watch::Receiver<LinkHealth>,
}

/// 取消时中止内部任务，运行器被 abort 时调度器随之终止。
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct AcquisitionSupervisor {
    ports: Vec<Arc<PortConfig>>,
    factory: Arc<dyn TransportFactory>,
    outlet: Arc<ReadingQueue>,
    config: SupervisorConfig,
}

impl AcquisitionSupervisor {
    pub fn new(
        ports: Vec<Arc<PortConfig>>,
        factory: Arc<dyn TransportFactory>,
        outlet: Arc<ReadingQueue>,
        config: SupervisorConfig,
    ) -> Result<Self, SupervisorError> {
        let mut seen = std::collections::HashSet::new();
        for port in &ports {
            if !seen.insert(port.name.clone()) {
                return Err(SupervisorError::DuplicatePort(port.name.clone()));
            }
        }
        Ok(Self {
            ports,
            factory,
            outlet,
            config,
        })
    }

    /// 为每个启用端口启动运行器。
    pub fn start(self) -> SupervisorHandle {
        let (trigger, shutdown) = shutdown_channel();
        let mut runners = JoinSet::new();
        let mut entries = HashMap::new();
        let mut order = Vec::with_capacity(self.ports.len());
        let mut running = Vec::new();

        for port in self.ports {
            order.push(port.name.clone());
            if !port.enabled {
                info!(target: "mbus.acquisition", port = %port.name, "port disabled, skipping");
                let (_, health) = watch::channel(LinkHealth::stopped(port.name.clone()));
                entries.insert(
                    port.name.clone(),
                    PortEntry {
                        config: port,
                        commands: None,
                        health,
                    },
                );
                continue;
            }

            let (health_tx, health_rx) = watch::channel(LinkHealth::new(port.name.clone()));
            let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer.max(1));
            let runner = PortRunner {
                port: port.clone(),
                factory: self.factory.clone(),
                outlet: self.outlet.clone(),
                policy: self.config.backoff,
                restart_delay: self.config.restart_delay,
                health: Arc::new(health_tx),
                commands: Arc::new(Mutex::new(command_rx)),
            };
            runners.spawn(runner.run(shutdown.clone()));
            running.push(port.name.clone());
            entries.insert(
                port.name.clone(),
                PortEntry {
                    config: port,
                    commands: Some(command_tx),
                    health: health_rx,
                },
            );
        }

        info!(
            target: "mbus.acquisition",
            ports = order.len(),
            running = running.len(),
            "acquisition supervisor started"
        );

        let (done_tx, done_rx) = watch::channel(false);
        let monitor = tokio::spawn(monitor(
            runners,
            running,
            shutdown,
            self.config.shutdown_grace,
            done_tx,
        ));

        SupervisorHandle {
            entries,
            order,
            trigger,
            monitor: Mutex::new(Some(monitor)),
            done: done_rx,
        }
    }
}

/// 监督器句柄：查询健康状态、下发写入、停机。
pub struct SupervisorHandle {
    entries: HashMap<String, PortEntry>,
    order: Vec<String>,
    trigger: ShutdownTrigger,
    monitor: Mutex<Option<JoinHandle<ShutdownReport>>>,
    done: watch::Receiver<bool>,
}

impl SupervisorHandle {
    /// 所有端口的健康快照（配置顺序）。
    pub fn health(&self) -> Vec<LinkHealth> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|entry| entry.health.borrow().clone())
            .collect()
    }

    pub fn port_health(&self, port: &str) -> Option<LinkHealth> {
        self.entries
            .get(port)
            .map(|entry| entry.health.borrow().clone())
    }

    pub fn ports(&self) -> Vec<Arc<PortConfig>> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|entry| entry.config.clone())
            .collect()
    }

    /// 校验、编码并在所属端口上执行一次写入，等待设备确认。
    pub async fn write_register(
        &self,
        port: &str,
        device: &str,
        register: &str,
        value: f64,
    ) -> Result<(), WriteError> {
        let entry = self
            .entries
            .get(port)
            .ok_or_else(|| WriteError::UnknownPort(port.to_string()))?;
        let command = WriteCommand::prepare(&entry.config, device, register, value)?;
        let sender = entry
            .commands
            .as_ref()
            .ok_or_else(|| WriteError::PortUnavailable(format!("port {} is disabled", port)))?;

        let deadline = command.timeout + WRITE_QUEUE_MARGIN;
        let (reply, response) = oneshot::channel();
        let exchange = async {
            sender
                .send(PortCommand::Write { command, reply })
                .await
                .map_err(|_| WriteError::PortUnavailable(format!("port {} is stopped", port)))?;
            response
                .await
                .map_err(|_| WriteError::PortUnavailable(format!("port {} dropped the write", port)))?
        };
        match timeout(deadline, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    target: "mbus.acquisition",
                    port,
                    device,
                    register,
                    deadline_ms = deadline.as_millis() as u64,
                    "write not acknowledged in time"
                );
                Err(WriteError::Timeout(deadline))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// 等待所有运行器结束（全部致命失败或已停机）。
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// 停机：通知所有调度器，在宽限期内等待退出，超时则中止。
    ///
    /// 重复调用返回空报告。
    pub async fn shutdown(&self) -> ShutdownReport {
        self.trigger.trigger();
        let monitor = self.monitor.lock().await.take();
        match monitor {
            Some(handle) => handle.await.unwrap_or_else(|err| {
                error!(target: "mbus.acquisition", error = %err, "supervisor monitor failed");
                ShutdownReport::default()
            }),
            None => ShutdownReport::default(),
        }
    }
}

async fn monitor(
    mut runners: JoinSet<PortExit>,
    running: Vec<String>,
    mut shutdown: Shutdown,
    grace: Duration,
    done: watch::Sender<bool>,
) -> ShutdownReport {
    let mut report = ShutdownReport::default();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = runners.join_next() => match next {
                Some(result) => collect(&mut report, result),
                None => {
                    warn!(target: "mbus.acquisition", "all port runners have stopped");
                    done.send_replace(true);
                    return report;
                }
            },
        }
    }

    let drained = timeout(grace, async {
        while let Some(result) = runners.join_next().await {
            collect(&mut report, result);
        }
    })
    .await;
    if drained.is_err() {
        runners.abort_all();
        while runners.join_next().await.is_some() {}
        report.aborted = running
            .into_iter()
            .filter(|port| !report.stopped.contains(port) && !report.fatal.contains(port))
            .collect();
        warn!(
            target: "mbus.acquisition",
            aborted = ?report.aborted,
            "shutdown grace elapsed, aborted remaining ports"
        );
    }

    info!(
        target: "mbus.acquisition",
        stopped = report.stopped.len(),
        aborted = report.aborted.len(),
        fatal = report.fatal.len(),
        "acquisition supervisor stopped"
    );
    done.send_replace(true);
    report
}

fn collect(report: &mut ShutdownReport, result: Result<PortExit, tokio::task::JoinError>) {
    match result {
        Ok(PortExit::Stopped(port)) => report.stopped.push(port),
        Ok(PortExit::Fatal(port)) => report.fatal.push(port),
        Err(err) => error!(target: "mbus.acquisition", error = %err, "port runner failed"),
    }
}

/// 单个端口的运行器：构造链路、运行调度器并在异常结束时重启。
struct PortRunner {
    port: Arc<PortConfig>,
    factory: Arc<dyn TransportFactory>,
    outlet: Arc<ReadingQueue>,
    policy: BackoffPolicy,
    restart_delay: Duration,
    health: Arc<watch::Sender<LinkHealth>>,
    commands: Arc<Mutex<mpsc::Receiver<PortCommand>>>,
}

impl PortRunner {
    async fn run(self, mut shutdown: Shutdown) -> PortExit {
        let name = self.port.name.clone();
        loop {
            if shutdown.is_triggered() {
                return PortExit::Stopped(name);
            }

            let transport = match self.factory.create(&self.port) {
                Ok(transport) => transport,
                Err(err) => {
                    let err = SchedulerError::from(err);
                    error!(target: "mbus.acquisition", port = %name, error = %err, "port stopped");
                    self.health.send_modify(|health| {
                        health.state = LinkState::Stopped;
                        health.last_error = Some(err.to_string());
                    });
                    return PortExit::Fatal(name);
                }
            };

            let scheduler = PortScheduler::new(
                self.port.clone(),
                transport,
                self.outlet.clone(),
                self.policy,
                self.health.clone(),
            );
            let mut task = AbortOnDrop(tokio::spawn(
                scheduler.run(shutdown.clone(), self.commands.clone()),
            ));

            let err = match (&mut task.0).await {
                Ok(()) if shutdown.is_triggered() => return PortExit::Stopped(name),
                Ok(()) => SchedulerError::Ended,
                Err(join_err) if join_err.is_panic() => {
                    SchedulerError::Panicked(panic_message(join_err.into_panic()))
                }
                Err(_) => return PortExit::Stopped(name),
            };

            mbus_telemetry::record_scheduler_restart();
            warn!(
                target: "mbus.acquisition",
                port = %name,
                error = %err,
                restart_in_ms = self.restart_delay.as_millis() as u64,
                "port scheduler exited, restarting"
            );
            self.health.send_modify(|health| {
                health.restarts += 1;
                health.state = LinkState::Connecting;
                health.last_error = Some(err.to_string());
            });

            tokio::select! {
                _ = shutdown.cancelled() => return PortExit::Stopped(name),
                _ = sleep(self.restart_delay) => {}
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
