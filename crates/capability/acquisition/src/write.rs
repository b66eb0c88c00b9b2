//! 写入命令：校验、编码，并交给所属端口的调度器串行执行。

use domain::{PortConfig, RegisterRegion};
use mbus_codec::{EncodeError, WordLayout, encode_register};
use mbus_protocol::TransportError;
use std::time::Duration;
use tokio::sync::oneshot;

/// 写入错误。
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("unknown port: {0}")]
    UnknownPort(String),
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    #[error("unknown register: {0}")]
    UnknownRegister(String),
    #[error("register is read-only: {0}")]
    ReadOnly(String),
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("link down: {0}")]
    LinkDown(String),
    #[error("port unavailable: {0}")]
    PortUnavailable(String),
    #[error("write not acknowledged within {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// 已编码、待执行的写入。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    pub device: String,
    pub register: String,
    pub unit: u8,
    pub region: RegisterRegion,
    pub address: u16,
    pub words: Vec<u16>,
    pub timeout: Duration,
}

impl WriteCommand {
    /// 按端口配置校验并编码一次写入。
    pub fn prepare(
        port: &PortConfig,
        device_name: &str,
        register_name: &str,
        value: f64,
    ) -> Result<Self, WriteError> {
        let device = port
            .find_device(device_name)
            .filter(|device| device.enabled)
            .ok_or_else(|| WriteError::UnknownDevice(device_name.to_string()))?;
        let register = device
            .find_register(register_name)
            .ok_or_else(|| WriteError::UnknownRegister(format!("{}/{}", device_name, register_name)))?;
        if register.read_only || !register.region.is_writable() {
            return Err(WriteError::ReadOnly(format!("{}/{}", device_name, register_name)));
        }

        let (byte_order, word_order) = port.order_for(register);
        let words = encode_register(register, WordLayout::new(byte_order, word_order), value)?;

        Ok(Self {
            device: device.name.clone(),
            register: register.name.clone(),
            unit: device.unit_address,
            region: register.region,
            address: register.address,
            words,
            timeout: device.effective_timeout(port.timeout),
        })
    }
}

/// 发往端口调度器的命令。
#[derive(Debug)]
pub enum PortCommand {
    Write {
        command: WriteCommand,
        reply: oneshot::Sender<Result<(), WriteError>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{
        ByteOrder, DataType, DeviceConfig, LinkEndpoint, RegisterConfig, TransportKind, WordOrder,
    };

    fn port() -> PortConfig {
        let register = |name: &str,
                        region: RegisterRegion,
                        address: u16,
                        data_type: DataType,
                        read_only: bool| RegisterConfig {
            region,
            address,
            name: name.to_string(),
            description: String::new(),
            unit: String::new(),
            data_type,
            scale: 0.1,
            offset: 0.0,
            precision: 1,
            read_only,
            byte_order: None,
            word_order: None,
        };
        PortConfig {
            name: "p1".to_string(),
            description: String::new(),
            transport: TransportKind::Tcp,
            endpoint: LinkEndpoint::Network {
                host: "127.0.0.1".to_string(),
                port: 502,
            },
            timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
            max_retries: 0,
            retry_delay: Duration::ZERO,
            enabled: true,
            byte_order: ByteOrder::Big,
            word_order: WordOrder::Little,
            coalesce_reads: false,
            devices: vec![DeviceConfig {
                name: "meter".to_string(),
                description: String::new(),
                unit_address: 3,
                poll_interval: Duration::from_secs(1),
                timeout: Some(Duration::from_millis(200)),
                enabled: true,
                registers: vec![
                    register("setpoint", RegisterRegion::Holding, 10, DataType::Uint32, false),
                    register("voltage", RegisterRegion::Input, 0, DataType::Uint16, false),
                    register("limit", RegisterRegion::Holding, 20, DataType::Uint16, true),
                ],
            }],
        }
    }

    #[test]
    fn prepare_encodes_with_port_layout() {
        let command = WriteCommand::prepare(&port(), "meter", "setpoint", 6553.6).unwrap();
        assert_eq!(command.unit, 3);
        assert_eq!(command.address, 10);
        // 65536 = 0x0001_0000，字序 little
        assert_eq!(command.words, vec![0x0000, 0x0001]);
        assert_eq!(command.timeout, Duration::from_millis(200));
    }

    #[test]
    fn input_and_read_only_registers_are_rejected() {
        let err = WriteCommand::prepare(&port(), "meter", "voltage", 1.0).unwrap_err();
        assert!(matches!(err, WriteError::ReadOnly(_)));
        let err = WriteCommand::prepare(&port(), "meter", "limit", 1.0).unwrap_err();
        assert!(matches!(err, WriteError::ReadOnly(_)));
    }

    #[test]
    fn unknown_targets_are_rejected() {
        let err = WriteCommand::prepare(&port(), "nope", "setpoint", 1.0).unwrap_err();
        assert!(matches!(err, WriteError::UnknownDevice(_)));
        let err = WriteCommand::prepare(&port(), "meter", "nope", 1.0).unwrap_err();
        assert!(matches!(err, WriteError::UnknownRegister(_)));
    }

    #[test]
    fn out_of_range_value_fails_encoding() {
        let err = WriteCommand::prepare(&port(), "meter", "setpoint", -5.0).unwrap_err();
        assert!(matches!(err, WriteError::Encode(EncodeError::OutOfRange { .. })));
    }
}
