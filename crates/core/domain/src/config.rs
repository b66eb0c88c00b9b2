//! 端口、设备、寄存器配置模型。
//!
//! 这些结构由配置加载模块校验后构造，之后以 `Arc<PortConfig>` 的形式注入各组件，
//! 运行期间不会被修改；重新配置需要重启对应端口的调度器。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 链路传输类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Modbus TCP（MBAP 报文头）
    Tcp,
    /// RTU 帧经 TCP 网关透传
    RtuTcp,
    /// RTU 串口
    RtuSerial,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::RtuTcp => "rtu_tcp",
            Self::RtuSerial => "rtu_serial",
        }
    }
}

/// Modbus 数据区。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterRegion {
    /// 线圈（FC01 读 / FC05、FC15 写）
    Coil,
    /// 离散输入（FC02，只读）
    #[serde(alias = "discrete")]
    DiscreteInput,
    /// 保持寄存器（FC03 读 / FC06、FC16 写）
    Holding,
    /// 输入寄存器（FC04，只读）
    Input,
}

impl RegisterRegion {
    /// 位数据区（线圈、离散输入）。
    pub fn is_bit(&self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    /// 协议层面允许写入的数据区。
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Coil | Self::Holding)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coil => "coil",
            Self::DiscreteInput => "discrete_input",
            Self::Holding => "holding",
            Self::Input => "input",
        }
    }
}

/// 寄存器数据类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Uint16,
    Int16,
    Uint32,
    Int32,
    #[serde(alias = "float")]
    Float32,
    Float64,
    #[serde(alias = "bit")]
    Bool,
}

impl DataType {
    /// 该类型占用的 16 位字数。
    pub fn word_count(&self) -> usize {
        match self {
            Self::Uint16 | Self::Int16 | Self::Bool => 1,
            Self::Uint32 | Self::Int32 | Self::Float32 => 2,
            Self::Float64 => 4,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Uint16 | Self::Int16 | Self::Uint32 | Self::Int32
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Bool => "bool",
        }
    }
}

/// 字内字节序。`Little` 表示每个寄存器内高低字节互换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// 多字类型的字序。`Little` 表示低位字在前（网关常见的 CDAB 排列）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    #[default]
    Big,
    Little,
}

/// 串口校验位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Parity {
    #[default]
    #[serde(alias = "N", alias = "none")]
    None,
    #[serde(alias = "O", alias = "odd")]
    Odd,
    #[serde(alias = "E", alias = "even")]
    Even,
}

/// 串口停止位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// 串口参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// 设备路径，例如 `/dev/ttyUSB0`
    pub device: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// 数据位（5-8）
    pub data_bits: u8,
}

impl SerialSettings {
    /// 单个字符在线路上占用的位数（起始位 + 数据位 + 校验位 + 停止位）。
    pub fn bits_per_char(&self) -> u32 {
        let parity = if self.parity == Parity::None { 0 } else { 1 };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        1 + u32::from(self.data_bits) + parity + stop
    }
}

/// 链路端点。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEndpoint {
    Network { host: String, port: u16 },
    Serial(SerialSettings),
}

impl std::fmt::Display for LinkEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network { host, port } => write!(f, "{}:{}", host, port),
            Self::Serial(serial) => write!(f, "{}@{}", serial.device, serial.baud_rate),
        }
    }
}

/// 物理端口配置。
#[derive(Debug, Clone)]
pub struct PortConfig {
    pub name: String,
    pub description: String,
    pub transport: TransportKind,
    pub endpoint: LinkEndpoint,
    /// 单次请求超时
    pub timeout: Duration,
    /// 建链超时
    pub connect_timeout: Duration,
    /// 单个寄存器超时 / 协议错误时的最大重试次数
    pub max_retries: u32,
    /// 重试间隔
    pub retry_delay: Duration,
    pub enabled: bool,
    /// 端口默认字节序，寄存器可覆盖
    pub byte_order: ByteOrder,
    /// 端口默认字序，寄存器可覆盖
    pub word_order: WordOrder,
    /// 合并同一数据区的连续寄存器为一次读取
    pub coalesce_reads: bool,
    /// 按配置顺序排列的设备
    pub devices: Vec<DeviceConfig>,
}

impl PortConfig {
    pub fn enabled_devices(&self) -> impl Iterator<Item = &DeviceConfig> {
        self.devices.iter().filter(|device| device.enabled)
    }

    pub fn find_device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|device| device.name == name)
    }

    /// 寄存器最终生效的字节序与字序。
    pub fn order_for(&self, register: &RegisterConfig) -> (ByteOrder, WordOrder) {
        (
            register.byte_order.unwrap_or(self.byte_order),
            register.word_order.unwrap_or(self.word_order),
        )
    }
}

/// 设备配置。
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub name: String,
    pub description: String,
    /// 从站地址（1-247）
    pub unit_address: u8,
    pub poll_interval: Duration,
    /// 覆盖端口超时
    pub timeout: Option<Duration>,
    pub enabled: bool,
    pub registers: Vec<RegisterConfig>,
}

impl DeviceConfig {
    pub fn effective_timeout(&self, port_timeout: Duration) -> Duration {
        self.timeout.unwrap_or(port_timeout)
    }

    pub fn find_register(&self, name: &str) -> Option<&RegisterConfig> {
        self.registers.iter().find(|register| register.name == name)
    }
}

/// 寄存器配置。
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterConfig {
    pub region: RegisterRegion,
    pub address: u16,
    pub name: String,
    pub description: String,
    pub unit: String,
    pub data_type: DataType,
    pub scale: f64,
    pub offset: f64,
    /// 保留的小数位数
    pub precision: u8,
    pub read_only: bool,
    pub byte_order: Option<ByteOrder>,
    pub word_order: Option<WordOrder>,
}

impl RegisterConfig {
    /// 一次读取需要的地址数量。位数据区每个寄存器只占一个地址。
    pub fn word_count(&self) -> u16 {
        if self.region.is_bit() {
            1
        } else {
            self.data_type.word_count() as u16
        }
    }

    /// 占用的最后一个地址（含）。
    pub fn end_address(&self) -> u32 {
        u32::from(self.address) + u32::from(self.word_count()) - 1
    }
}
