#![allow(dead_code)]

use async_trait::async_trait;
use domain::{
    ByteOrder, DataType, DeviceConfig, LinkEndpoint, PortConfig, RegisterConfig, RegisterRegion,
    TransportKind, WordOrder,
};
use mbus_protocol::{LinkTransport, TransportError, TransportFactory};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// 一次读请求的记录。
#[derive(Debug, Clone)]
pub struct Call {
    pub unit: u8,
    pub region: RegisterRegion,
    pub start: u16,
    pub count: u16,
    pub at: Instant,
}

#[derive(Default)]
struct ScriptState {
    /// 按（单元号，起始地址）排队的一次性应答
    scripted: HashMap<(u8, u16), VecDeque<Result<Vec<u16>, TransportError>>>,
    /// 未排队时按地址返回的寄存器值，缺省为 0
    memory: HashMap<(u8, u16), u16>,
    calls: Vec<Call>,
    writes: Vec<(u8, u16, Vec<u16>)>,
    link_down: bool,
    delay: Duration,
    in_flight: bool,
    overlap: bool,
    panic_next: bool,
    closes: usize,
    close_delay: Duration,
}

/// 可编排的模拟链路，多个 `MockTransport` 共享同一份状态。
#[derive(Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn transport(&self) -> MockTransport {
        MockTransport {
            script: self.clone(),
        }
    }

    pub fn push(&self, unit: u8, start: u16, response: Result<Vec<u16>, TransportError>) {
        self.lock()
            .scripted
            .entry((unit, start))
            .or_default()
            .push_back(response);
    }

    pub fn set_word(&self, unit: u8, address: u16, value: u16) {
        self.lock().memory.insert((unit, address), value);
    }

    pub fn set_link_down(&self, down: bool) {
        self.lock().link_down = down;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// 关闭链路时的耗时，用于模拟不及时退出的调度器。
    pub fn set_close_delay(&self, delay: Duration) {
        self.lock().close_delay = delay;
    }

    pub fn panic_next(&self) {
        self.lock().panic_next = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, unit: u8) -> Vec<Call> {
        self.calls().into_iter().filter(|call| call.unit == unit).collect()
    }

    pub fn writes(&self) -> Vec<(u8, u16, Vec<u16>)> {
        self.lock().writes.clone()
    }

    pub fn overlap_detected(&self) -> bool {
        self.lock().overlap
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    fn begin(&self) -> Duration {
        let mut state = self.lock();
        if state.in_flight {
            state.overlap = true;
        }
        state.in_flight = true;
        state.delay
    }

    fn finish(&self) -> Result<(), TransportError> {
        let panic = {
            let mut state = self.lock();
            state.in_flight = false;
            std::mem::take(&mut state.panic_next)
        };
        if panic {
            panic!("scripted transport panic");
        }
        if self.lock().link_down {
            return Err(TransportError::LinkDown("scripted link down".to_string()));
        }
        Ok(())
    }
}

pub struct MockTransport {
    script: Script,
}

#[async_trait]
impl LinkTransport for MockTransport {
    async fn read_registers(
        &mut self,
        unit: u8,
        region: RegisterRegion,
        start: u16,
        count: u16,
        _timeout: Duration,
    ) -> Result<Vec<u16>, TransportError> {
        self.script.lock().calls.push(Call {
            unit,
            region,
            start,
            count,
            at: Instant::now(),
        });
        let delay = self.script.begin();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.script.finish()?;

        let mut state = self.script.lock();
        if let Some(response) = state
            .scripted
            .get_mut(&(unit, start))
            .and_then(|queue| queue.pop_front())
        {
            return response;
        }
        Ok((0..count)
            .map(|offset| {
                state
                    .memory
                    .get(&(unit, start + offset))
                    .copied()
                    .unwrap_or(0)
            })
            .collect())
    }

    async fn write_registers(
        &mut self,
        unit: u8,
        _region: RegisterRegion,
        start: u16,
        values: &[u16],
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let delay = self.script.begin();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.script.finish()?;

        let mut state = self.script.lock();
        state.writes.push((unit, start, values.to_vec()));
        for (offset, value) in values.iter().enumerate() {
            state.memory.insert((unit, start + offset as u16), *value);
        }
        Ok(())
    }

    async fn close(&mut self) {
        let delay = {
            let mut state = self.script.lock();
            state.closes += 1;
            state.close_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }
}

/// 返回共享同一脚本的模拟链路；`fail` 时构造失败。
pub struct MockFactory {
    pub script: Script,
    pub fail: bool,
}

impl TransportFactory for MockFactory {
    fn create(&self, port: &PortConfig) -> Result<Box<dyn LinkTransport>, TransportError> {
        if self.fail {
            return Err(TransportError::InvalidConfig(format!(
                "port {} has no usable endpoint",
                port.name
            )));
        }
        Ok(Box::new(self.script.transport()))
    }
}

pub fn register(name: &str, region: RegisterRegion, address: u16, data_type: DataType) -> RegisterConfig {
    RegisterConfig {
        region,
        address,
        name: name.to_string(),
        description: String::new(),
        unit: "V".to_string(),
        data_type,
        scale: 1.0,
        offset: 0.0,
        precision: 2,
        read_only: true,
        byte_order: None,
        word_order: None,
    }
}

pub fn holding(name: &str, address: u16) -> RegisterConfig {
    register(name, RegisterRegion::Holding, address, DataType::Uint16)
}

pub fn device(name: &str, unit: u8, interval: Duration, registers: Vec<RegisterConfig>) -> DeviceConfig {
    DeviceConfig {
        name: name.to_string(),
        description: String::new(),
        unit_address: unit,
        poll_interval: interval,
        timeout: None,
        enabled: true,
        registers,
    }
}

pub fn port(name: &str, devices: Vec<DeviceConfig>) -> PortConfig {
    PortConfig {
        name: name.to_string(),
        description: String::new(),
        transport: TransportKind::Tcp,
        endpoint: LinkEndpoint::Network {
            host: "127.0.0.1".to_string(),
            port: 502,
        },
        timeout: Duration::from_millis(200),
        connect_timeout: Duration::from_millis(200),
        max_retries: 0,
        retry_delay: Duration::from_millis(10),
        enabled: true,
        byte_order: ByteOrder::Big,
        word_order: WordOrder::Big,
        coalesce_reads: false,
        devices,
    }
}
