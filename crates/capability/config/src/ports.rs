//! 端口文档 → 领域配置，收集全部校验错误。

use crate::document::{DeviceDocument, PortDocument, PortsDocument, RegisterDocument};
use domain::{
    DataType, DeviceConfig, LinkEndpoint, PortConfig, RegisterConfig, SerialSettings, StopBits,
    TransportKind,
};
use std::collections::HashSet;
use std::time::Duration;

const BAUD_RATES: [u32; 10] = [300, 600, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];
const MAX_PRECISION: u32 = 10;

/// 转换全部端口；任何错误都记入 `errors`，出错的端口不返回。
pub(crate) fn build_ports(
    document: PortsDocument,
    connect_timeout: Duration,
    errors: &mut Vec<String>,
) -> Vec<PortConfig> {
    let mut ports = Vec::with_capacity(document.len());
    let mut device_names = HashSet::new();
    for (name, port) in document {
        let before = errors.len();
        let config = build_port(&name, port, connect_timeout, &mut device_names, errors);
        if errors.len() == before {
            ports.push(config);
        }
    }
    ports
}

fn build_port(
    name: &str,
    port: PortDocument,
    connect_timeout: Duration,
    device_names: &mut HashSet<String>,
    errors: &mut Vec<String>,
) -> PortConfig {
    if name.is_empty()
        || !name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        errors.push(format!(
            "port {:?}: name may only contain letters, digits, '_' and '-'",
            name
        ));
    }
    let context = format!("port {}", name);
    let endpoint = endpoint(&context, &port, errors);
    let timeout = seconds(&context, "timeout", port.timeout, 0.1, errors);
    let retry_delay = seconds(&context, "retry_delay", port.retry_delay, 0.0, errors);
    let connect_timeout = match port.connect_timeout {
        Some(value) => seconds(&context, "connect_timeout", value, 0.1, errors),
        None => connect_timeout,
    };

    let mut devices = Vec::with_capacity(port.devices.len());
    let mut units = HashSet::new();
    for device in port.devices {
        if !device_names.insert(device.name.clone()) {
            errors.push(format!(
                "{}: device name {:?} is already used",
                context, device.name
            ));
        }
        if device.enabled && u8::try_from(device.address).is_ok_and(|unit| !units.insert(unit)) {
            errors.push(format!(
                "{}: unit address {} is used by more than one enabled device",
                context, device.address
            ));
        }
        devices.push(build_device(&context, device, errors));
    }

    PortConfig {
        name: name.to_string(),
        description: port.description,
        transport: port.transport,
        endpoint,
        timeout,
        connect_timeout,
        max_retries: port.max_retries,
        retry_delay,
        enabled: port.enabled,
        byte_order: port.byteorder,
        word_order: port.wordorder,
        coalesce_reads: port.coalesce_reads,
        devices,
    }
}

fn endpoint(context: &str, port: &PortDocument, errors: &mut Vec<String>) -> LinkEndpoint {
    match port.transport {
        TransportKind::Tcp | TransportKind::RtuTcp => {
            let host = match port.host.as_deref().map(str::trim) {
                Some(host) if !host.is_empty() => host.to_string(),
                _ => {
                    errors.push(format!(
                        "{}: host is required for {}",
                        context,
                        port.transport.as_str()
                    ));
                    String::new()
                }
            };
            let number = match port.port {
                Some(number @ 1..=65535) => number as u16,
                Some(number) => {
                    errors.push(format!("{}: port {} is out of range 1-65535", context, number));
                    0
                }
                None => {
                    errors.push(format!(
                        "{}: port is required for {}",
                        context,
                        port.transport.as_str()
                    ));
                    0
                }
            };
            LinkEndpoint::Network { host, port: number }
        }
        TransportKind::RtuSerial => {
            let device = match port.port_name.as_deref().map(str::trim) {
                Some(device) if !device.is_empty() => device.to_string(),
                _ => {
                    errors.push(format!("{}: port_name is required for rtu_serial", context));
                    String::new()
                }
            };
            if !BAUD_RATES.contains(&port.baudrate) {
                errors.push(format!(
                    "{}: unsupported baudrate {}",
                    context, port.baudrate
                ));
            }
            let stop_bits = match port.stopbits {
                1 => StopBits::One,
                2 => StopBits::Two,
                other => {
                    errors.push(format!("{}: stopbits must be 1 or 2, got {}", context, other));
                    StopBits::One
                }
            };
            if !(5..=8).contains(&port.bytesize) {
                errors.push(format!(
                    "{}: bytesize must be 5-8, got {}",
                    context, port.bytesize
                ));
            }
            LinkEndpoint::Serial(SerialSettings {
                device,
                baud_rate: port.baudrate,
                parity: port.parity,
                stop_bits,
                data_bits: port.bytesize,
            })
        }
    }
}

fn build_device(context: &str, device: DeviceDocument, errors: &mut Vec<String>) -> DeviceConfig {
    let context = format!("{} device {}", context, device.name);
    if device.name.trim().is_empty() {
        errors.push(format!("{}: name must not be empty", context));
    }
    let unit_address = match device.address {
        address @ 1..=247 => address as u8,
        address => {
            errors.push(format!(
                "{}: unit address {} is out of range 1-247",
                context, address
            ));
            0
        }
    };
    let poll_interval = seconds(&context, "poll_interval", device.poll_interval, 0.0, errors);
    let timeout = device
        .timeout
        .map(|value| seconds(&context, "timeout", value, 0.1, errors));

    let mut names = HashSet::new();
    let mut registers = Vec::with_capacity(device.registers.len());
    for register in device.registers {
        let register = build_register(&context, register, errors);
        if !names.insert(register.name.clone()) {
            errors.push(format!(
                "{}: register name {:?} is declared twice",
                context, register.name
            ));
        }
        registers.push(register);
    }

    DeviceConfig {
        name: device.name,
        description: device.description,
        unit_address,
        poll_interval,
        timeout,
        enabled: device.enabled,
        registers,
    }
}

fn build_register(
    context: &str,
    register: RegisterDocument,
    errors: &mut Vec<String>,
) -> RegisterConfig {
    let name = register
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("register_{}", register.address));
    let context = format!("{} register {}", context, name);

    if register.region.is_bit() && register.data_type != DataType::Bool {
        errors.push(format!(
            "{}: {} registers only hold bool, got {}",
            context,
            register.region.as_str(),
            register.data_type.as_str()
        ));
    }
    let words = if register.region.is_bit() {
        1
    } else {
        register.data_type.word_count() as u32
    };
    let address = match u16::try_from(register.address) {
        Ok(address) if register.address + words - 1 <= u32::from(u16::MAX) => address,
        _ => {
            errors.push(format!(
                "{}: address {} with {} word(s) exceeds the 16-bit address space",
                context, register.address, words
            ));
            0
        }
    };
    if register.precision > MAX_PRECISION {
        errors.push(format!(
            "{}: precision {} exceeds {}",
            context, register.precision, MAX_PRECISION
        ));
    }
    if !register.scale.is_finite() || !register.offset.is_finite() {
        errors.push(format!("{}: scale and offset must be finite", context));
    }
    if !register.read_only {
        if !register.region.is_writable() {
            errors.push(format!(
                "{}: {} registers cannot be written",
                context,
                register.region.as_str()
            ));
        }
        if register.scale == 0.0 {
            errors.push(format!("{}: writable registers need a non-zero scale", context));
        }
    }

    RegisterConfig {
        region: register.region,
        address,
        name,
        description: register.description,
        unit: register.unit,
        data_type: register.data_type,
        scale: register.scale,
        offset: register.offset,
        precision: register.precision.min(MAX_PRECISION) as u8,
        read_only: register.read_only,
        byte_order: register.byteorder,
        word_order: register.wordorder,
    }
}

/// 秒数转 `Duration`，小于 `min` 或非有限值记为错误。
pub(crate) fn seconds(
    context: &str,
    field: &str,
    value: f64,
    min: f64,
    errors: &mut Vec<String>,
) -> Duration {
    if !value.is_finite() || value < min {
        errors.push(format!(
            "{}: {} must be a number of seconds >= {}, got {}",
            context, field, min, value
        ));
        return Duration::from_secs_f64(min);
    }
    match Duration::try_from_secs_f64(value) {
        Ok(duration) => duration,
        Err(_) => {
            errors.push(format!(
                "{}: {} is out of range, got {}",
                context, field, value
            ));
            Duration::from_secs_f64(min)
        }
    }
}
