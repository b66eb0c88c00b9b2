//! 单设备轮询：按配置顺序读取寄存器，失败只影响该寄存器。

use domain::{
    DeviceConfig, PortConfig, Quality, Reading, RegisterConfig, RegisterRegion, now_epoch_ms,
};
use mbus_codec::{WordLayout, decode_register};
use mbus_protocol::{LinkTransport, TransportError};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// 单次读取的地址上限（FC03/FC04 为 125 字，FC01/FC02 为 2000 位）。
const MAX_WORDS_PER_READ: u32 = 125;
const MAX_BITS_PER_READ: u32 = 2000;

/// 一次设备轮询的结果。
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// 与寄存器配置顺序一致，每个寄存器恰好一条
    pub readings: Vec<Arc<Reading>>,
    /// 链路断开，调度器需要进入退避
    pub link_down: bool,
    /// 至少收到一次设备应答（含异常应答）
    pub responded: bool,
    pub last_error: Option<String>,
}

impl PollOutcome {
    pub fn failed_count(&self) -> usize {
        self.readings.iter().filter(|reading| !reading.is_good()).count()
    }
}

/// 合并后的一次读取。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReadBlock {
    pub region: RegisterRegion,
    pub start: u16,
    pub count: u16,
    /// 覆盖的寄存器下标（配置顺序）
    pub registers: Range<usize>,
}

/// 把寄存器列表切分为读取块。
///
/// 只合并配置顺序中相邻、同一数据区且地址连续的寄存器，保证读数顺序与配置一致。
pub(crate) fn plan_reads(registers: &[RegisterConfig], coalesce: bool) -> Vec<ReadBlock> {
    let mut blocks: Vec<ReadBlock> = Vec::with_capacity(registers.len());
    for (index, register) in registers.iter().enumerate() {
        if coalesce && let Some(last) = blocks.last_mut() {
            let limit = if register.region.is_bit() {
                MAX_BITS_PER_READ
            } else {
                MAX_WORDS_PER_READ
            };
            let contiguous = u32::from(last.start) + u32::from(last.count)
                == u32::from(register.address);
            let merged = u32::from(last.count) + u32::from(register.word_count());
            if last.region == register.region && contiguous && merged <= limit {
                last.count = merged as u16;
                last.registers.end = index + 1;
                continue;
            }
        }
        blocks.push(ReadBlock {
            region: register.region,
            start: register.address,
            count: register.word_count(),
            registers: index..index + 1,
        });
    }
    blocks
}

/// 设备轮询器。
#[derive(Debug, Clone)]
pub struct DevicePoller {
    port: Arc<PortConfig>,
}

impl DevicePoller {
    pub fn new(port: Arc<PortConfig>) -> Self {
        Self { port }
    }

    /// 轮询一个设备。返回的读数与该设备的寄存器一一对应。
    pub async fn poll(&self, transport: &mut dyn LinkTransport, device: &DeviceConfig) -> PollOutcome {
        let deadline = device.effective_timeout(self.port.timeout);
        let mut outcome = PollOutcome {
            readings: Vec::with_capacity(device.registers.len()),
            ..PollOutcome::default()
        };

        for block in plan_reads(&device.registers, self.port.coalesce_reads) {
            if outcome.link_down {
                for register in &device.registers[block.registers.clone()] {
                    outcome
                        .readings
                        .push(self.error_reading(device, register, "link down".to_string()));
                }
                continue;
            }

            if block.registers.len() > 1 {
                match self
                    .read_with_retry(transport, device.unit_address, block.region, block.start, block.count, deadline)
                    .await
                {
                    Ok(words) => {
                        outcome.responded = true;
                        for register in &device.registers[block.registers.clone()] {
                            let offset = usize::from(register.address - block.start);
                            let len = usize::from(register.word_count());
                            let slice = words.get(offset..offset + len).unwrap_or(&[]);
                            let reading = self.decode_reading(device, register, slice);
                            self.note(&mut outcome, &reading);
                            outcome.readings.push(reading);
                        }
                        continue;
                    }
                    Err(err) if err.is_link_down() => {
                        for register in &device.registers[block.registers.clone()] {
                            outcome
                                .readings
                                .push(self.error_reading(device, register, err.to_string()));
                        }
                        self.link_lost(&mut outcome, device, &err);
                        continue;
                    }
                    Err(err) => {
                        if matches!(err, TransportError::Exception(_)) {
                            outcome.responded = true;
                        }
                        debug!(
                            target: "mbus.acquisition",
                            port = %self.port.name,
                            device = %device.name,
                            start = block.start,
                            count = block.count,
                            error = %err,
                            "block read failed, falling back to single reads"
                        );
                    }
                }
            }

            for register in &device.registers[block.registers.clone()] {
                if outcome.link_down {
                    outcome
                        .readings
                        .push(self.error_reading(device, register, "link down".to_string()));
                    continue;
                }
                let reading = self
                    .read_register(transport, device, register, deadline, &mut outcome)
                    .await;
                outcome.readings.push(reading);
            }
        }

        outcome
    }

    async fn read_register(
        &self,
        transport: &mut dyn LinkTransport,
        device: &DeviceConfig,
        register: &RegisterConfig,
        deadline: Duration,
        outcome: &mut PollOutcome,
    ) -> Arc<Reading> {
        let result = self
            .read_with_retry(
                transport,
                device.unit_address,
                register.region,
                register.address,
                register.word_count(),
                deadline,
            )
            .await;

        match result {
            Ok(words) => {
                outcome.responded = true;
                let reading = self.decode_reading(device, register, &words);
                self.note(outcome, &reading);
                reading
            }
            Err(err) => {
                if err.is_link_down() {
                    self.link_lost(outcome, device, &err);
                } else {
                    if matches!(err, TransportError::Exception(_)) {
                        outcome.responded = true;
                    }
                    warn!(
                        target: "mbus.acquisition",
                        port = %self.port.name,
                        device = %device.name,
                        register = %register.name,
                        address = register.address,
                        error = %err,
                        "register read failed"
                    );
                    outcome.last_error = Some(format!("{}: {}", register.name, err));
                }
                self.error_reading(device, register, err.to_string())
            }
        }
    }

    /// 超时与协议错误按端口配置重试，其余错误立即返回。
    async fn read_with_retry(
        &self,
        transport: &mut dyn LinkTransport,
        unit: u8,
        region: RegisterRegion,
        start: u16,
        count: u16,
        deadline: Duration,
    ) -> Result<Vec<u16>, TransportError> {
        let mut attempt = 0u32;
        loop {
            match transport
                .read_registers(unit, region, start, count, deadline)
                .await
            {
                Ok(words) => return Ok(words),
                Err(err) if err.is_retryable() && attempt < self.port.max_retries => {
                    attempt += 1;
                    mbus_telemetry::record_retry();
                    debug!(
                        target: "mbus.acquisition",
                        port = %self.port.name,
                        unit,
                        start,
                        attempt,
                        error = %err,
                        "retrying read"
                    );
                    sleep(self.port.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn link_lost(&self, outcome: &mut PollOutcome, device: &DeviceConfig, err: &TransportError) {
        warn!(
            target: "mbus.acquisition",
            port = %self.port.name,
            device = %device.name,
            error = %err,
            "link down, abandoning device poll"
        );
        outcome.link_down = true;
        outcome.last_error = Some(err.to_string());
    }

    fn note(&self, outcome: &mut PollOutcome, reading: &Reading) {
        if let Some(error) = &reading.error {
            outcome.last_error = Some(format!("{}: {}", reading.register, error));
        }
    }

    fn decode_reading(&self, device: &DeviceConfig, register: &RegisterConfig, words: &[u16]) -> Arc<Reading> {
        let (byte_order, word_order) = self.port.order_for(register);
        match decode_register(register, WordLayout::new(byte_order, word_order), words) {
            Ok(value) => self.reading(device, register, Ok(value), words.to_vec()),
            Err(err) => {
                warn!(
                    target: "mbus.acquisition",
                    port = %self.port.name,
                    device = %device.name,
                    register = %register.name,
                    raw = ?words,
                    error = %err,
                    "decode failed"
                );
                self.reading(device, register, Err(err.to_string()), words.to_vec())
            }
        }
    }

    fn error_reading(&self, device: &DeviceConfig, register: &RegisterConfig, error: String) -> Arc<Reading> {
        self.reading(device, register, Err(error), Vec::new())
    }

    fn reading(
        &self,
        device: &DeviceConfig,
        register: &RegisterConfig,
        value: Result<f64, String>,
        raw: Vec<u16>,
    ) -> Arc<Reading> {
        let (value, quality, error) = match value {
            Ok(value) => (Some(value), Quality::Good, None),
            Err(error) => (None, Quality::Error, Some(error)),
        };
        Arc::new(Reading {
            port: self.port.name.clone(),
            device: device.name.clone(),
            unit_address: device.unit_address,
            register: register.name.clone(),
            ts_ms: now_epoch_ms(),
            value,
            raw,
            unit: register.unit.clone(),
            quality,
            error,
        })
    }
}
