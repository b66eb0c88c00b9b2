use crate::error::TransportError;
use crate::link::ModbusLink;
use async_trait::async_trait;
use domain::{PortConfig, RegisterRegion, TransportKind};
use std::time::Duration;

/// 一条物理链路。
///
/// 方法取 `&mut self`，同一链路上同一时刻最多只有一个请求在途。
/// 线圈与离散输入以 0 / 1 的寄存器字返回。
#[async_trait]
pub trait LinkTransport: Send {
    async fn read_registers(
        &mut self,
        unit: u8,
        region: RegisterRegion,
        start: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, TransportError>;

    async fn write_registers(
        &mut self,
        unit: u8,
        region: RegisterRegion,
        start: u16,
        values: &[u16],
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// 关闭连接；之后的请求会重新建链。
    async fn close(&mut self);

    fn kind(&self) -> TransportKind;
}

/// 按端口配置构造链路。构造失败对该端口是致命的。
pub trait TransportFactory: Send + Sync {
    fn create(&self, port: &PortConfig) -> Result<Box<dyn LinkTransport>, TransportError>;
}

/// 基于 tokio-modbus 的默认工厂。
#[derive(Debug, Clone, Copy, Default)]
pub struct ModbusTransportFactory;

impl TransportFactory for ModbusTransportFactory {
    fn create(&self, port: &PortConfig) -> Result<Box<dyn LinkTransport>, TransportError> {
        Ok(Box::new(ModbusLink::new(port)?))
    }
}
