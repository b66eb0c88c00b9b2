//! 端口调度器：独占一条链路，按各设备的轮询周期串行轮询。
//!
//! ```text
//! Idle ──(有设备到期)──▶ Polling(device) ──▶ Idle
//!   │                                         ▲
//!   └──(写入命令)──▶ Writing ─────────────────┘
//! ```
//!
//! 链路断开时进入 `Backoff(n)`，退避期间不轮询、写入直接拒绝；
//! 任意一次成功交换后回到 `Healthy`。

use crate::backoff::{BackoffPolicy, LinkStatus};
use crate::poller::{DevicePoller, PollOutcome};
use crate::shutdown::Shutdown;
use crate::write::{PortCommand, WriteCommand, WriteError};
use domain::{LinkHealth, LinkState, PortConfig, now_epoch_ms};
use mbus_distribution::ReadingQueue;
use mbus_protocol::{LinkTransport, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// 没有启用设备时的空闲唤醒间隔。
const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// 调度器异常结束的原因（由端口运行器判定）。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("transport construction failed: {0}")]
    Transport(#[from] TransportError),
    #[error("scheduler panicked: {0}")]
    Panicked(String),
    #[error("scheduler ended without shutdown")]
    Ended,
}

#[derive(Debug, Clone, Copy)]
struct DeviceSlot {
    /// 在 `PortConfig.devices` 中的下标
    device: usize,
    next_due: Instant,
}

pub struct PortScheduler {
    port: Arc<PortConfig>,
    transport: Box<dyn LinkTransport>,
    poller: DevicePoller,
    slots: Vec<DeviceSlot>,
    link: LinkStatus,
    policy: BackoffPolicy,
    health: Arc<watch::Sender<LinkHealth>>,
    outlet: Arc<ReadingQueue>,
}

impl PortScheduler {
    pub fn new(
        port: Arc<PortConfig>,
        transport: Box<dyn LinkTransport>,
        outlet: Arc<ReadingQueue>,
        policy: BackoffPolicy,
        health: Arc<watch::Sender<LinkHealth>>,
    ) -> Self {
        let now = Instant::now();
        let slots = port
            .devices
            .iter()
            .enumerate()
            .filter(|(_, device)| device.enabled)
            .map(|(device, _)| DeviceSlot {
                device,
                next_due: now,
            })
            .collect();
        Self {
            poller: DevicePoller::new(port.clone()),
            port,
            transport,
            slots,
            link: LinkStatus::Healthy,
            policy,
            health,
            outlet,
        }
    }

    /// 运行直到收到停机信号。退出前关闭链路。
    pub async fn run(mut self, mut shutdown: Shutdown, commands: Arc<Mutex<mpsc::Receiver<PortCommand>>>) {
        let mut commands = commands.lock().await;
        let mut commands_open = true;
        info!(
            target: "mbus.acquisition",
            port = %self.port.name,
            transport = self.port.transport.as_str(),
            devices = self.slots.len(),
            "port scheduler started"
        );

        loop {
            if shutdown.is_triggered() {
                break;
            }
            // 排队的写入先于下一次轮询执行
            if commands_open {
                match commands.try_recv() {
                    Ok(command) => {
                        tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => break,
                            _ = self.execute(command) => {}
                        }
                        continue;
                    }
                    Err(TryRecvError::Disconnected) => commands_open = false,
                    Err(TryRecvError::Empty) => {}
                }
            }
            let now = Instant::now();
            if self.link.ready(now)
                && let Some(slot) = self.due_slot(now)
            {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = self.poll_slot(slot) => {}
                }
                // 让出执行权，避免零周期设备独占工作线程
                tokio::task::yield_now().await;
                continue;
            }

            let wake_at = self.next_wake(now);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                command = commands.recv(), if commands_open => match command {
                    Some(command) => {
                        tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => break,
                            _ = self.execute(command) => {}
                        }
                    }
                    None => commands_open = false,
                },
                _ = sleep_until(wake_at) => {}
            }
        }

        self.transport.close().await;
        self.health.send_modify(|health| {
            health.state = LinkState::Stopped;
            health.backoff_until_ms = None;
        });
        info!(target: "mbus.acquisition", port = %self.port.name, "port scheduler stopped");
    }

    /// 已到期设备中最早到期的一个；同时到期按配置顺序。
    fn due_slot(&self, now: Instant) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.next_due <= now)
            .min_by_key(|(_, slot)| slot.next_due)
            .map(|(index, _)| index)
    }

    fn next_wake(&self, now: Instant) -> Instant {
        let earliest = self
            .slots
            .iter()
            .map(|slot| slot.next_due)
            .min()
            .unwrap_or(now + IDLE_WAKE);
        match self.link.backoff_until() {
            Some(until) => earliest.max(until),
            None => earliest,
        }
    }

    async fn poll_slot(&mut self, slot: usize) {
        let port = self.port.clone();
        let device = &port.devices[self.slots[slot].device];
        let started = Instant::now();
        // 周期过大时退化为空闲唤醒间隔
        self.slots[slot].next_due = started
            .checked_add(device.poll_interval)
            .unwrap_or(started + IDLE_WAKE);

        let outcome = self.poller.poll(self.transport.as_mut(), device).await;
        let elapsed = started.elapsed();

        let failed = outcome.failed_count();
        mbus_telemetry::record_poll(failed == 0);
        mbus_telemetry::record_poll_latency_ms(elapsed.as_millis() as u64);
        debug!(
            target: "mbus.acquisition",
            port = %port.name,
            device = %device.name,
            readings = outcome.readings.len(),
            failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "device polled"
        );

        self.settle_link(&outcome);
        self.record_poll(&outcome, failed);

        for reading in outcome.readings {
            mbus_telemetry::record_reading(reading.is_good());
            if self.outlet.push(reading) {
                mbus_telemetry::record_ingress_drop();
            }
        }
    }

    fn settle_link(&mut self, outcome: &PollOutcome) {
        if outcome.link_down {
            let error = outcome.last_error.clone().unwrap_or_else(|| "link down".to_string());
            self.link_failed(&error);
        } else if outcome.responded {
            self.link_succeeded();
        } else if matches!(self.link, LinkStatus::Backoff { .. }) {
            // 退避后的探测没有任何应答
            let error = outcome.last_error.clone().unwrap_or_else(|| "no response".to_string());
            self.link_failed(&error);
        }
    }

    fn record_poll(&self, outcome: &PollOutcome, failed: usize) {
        let now_ms = now_epoch_ms();
        self.health.send_modify(|health| {
            health.total_polls += 1;
            if failed > 0 {
                health.failed_polls += 1;
            }
            if outcome.readings.iter().any(|reading| reading.is_good()) {
                health.last_success_ms = Some(now_ms);
            }
            if let Some(error) = &outcome.last_error {
                health.last_error = Some(error.clone());
            }
        });
    }

    async fn execute(&mut self, command: PortCommand) {
        match command {
            PortCommand::Write { command, reply } => {
                if reply.is_closed() {
                    debug!(
                        target: "mbus.acquisition",
                        port = %self.port.name,
                        device = %command.device,
                        register = %command.register,
                        "write abandoned by caller, skipped"
                    );
                    return;
                }
                let result = self.write(&command).await;
                mbus_telemetry::record_write(result.is_ok());
                match &result {
                    Ok(()) => info!(
                        target: "mbus.acquisition",
                        port = %self.port.name,
                        device = %command.device,
                        register = %command.register,
                        words = ?command.words,
                        "register written"
                    ),
                    Err(err) => warn!(
                        target: "mbus.acquisition",
                        port = %self.port.name,
                        device = %command.device,
                        register = %command.register,
                        error = %err,
                        "register write failed"
                    ),
                }
                // 调用方可能已放弃等待
                let _ = reply.send(result);
            }
        }
    }

    async fn write(&mut self, command: &WriteCommand) -> Result<(), WriteError> {
        if !self.link.ready(Instant::now()) {
            return Err(WriteError::LinkDown(format!(
                "port {} is backing off",
                self.port.name
            )));
        }

        let result = self
            .transport
            .write_registers(
                command.unit,
                command.region,
                command.address,
                &command.words,
                command.timeout,
            )
            .await;

        match result {
            Ok(()) => {
                self.link_succeeded();
                Ok(())
            }
            Err(err) if err.is_link_down() => {
                self.link_failed(&err.to_string());
                Err(WriteError::LinkDown(err.to_string()))
            }
            Err(err) => {
                if matches!(err, TransportError::Exception(_)) {
                    self.link_succeeded();
                }
                Err(WriteError::Transport(err))
            }
        }
    }

    fn link_succeeded(&mut self) {
        if let LinkStatus::Backoff { failures, .. } = self.link {
            info!(
                target: "mbus.acquisition",
                port = %self.port.name,
                failures,
                "link recovered"
            );
        }
        self.link = self.link.on_success();
        self.publish_link();
    }

    fn link_failed(&mut self, error: &str) {
        let now = Instant::now();
        self.link = self.link.on_failure(&self.policy, now);
        mbus_telemetry::record_link_down();
        let delay = self.policy.delay(self.link.failures());
        warn!(
            target: "mbus.acquisition",
            port = %self.port.name,
            failures = self.link.failures(),
            backoff_ms = delay.as_millis() as u64,
            error,
            "link failed, backing off"
        );
        self.health.send_modify(|health| {
            health.last_error = Some(error.to_string());
        });
        self.publish_link();
    }

    fn publish_link(&self) {
        let now = Instant::now();
        let now_ms = now_epoch_ms();
        let link = self.link;
        self.health.send_modify(|health| {
            health.consecutive_failures = link.failures();
            match link {
                LinkStatus::Healthy => {
                    health.state = LinkState::Healthy;
                    health.backoff_until_ms = None;
                }
                LinkStatus::Backoff { until, .. } => {
                    health.state = LinkState::Backoff;
                    let remaining = until.saturating_duration_since(now);
                    health.backoff_until_ms = Some(now_ms + remaining.as_millis() as i64);
                }
            }
        });
    }
}
