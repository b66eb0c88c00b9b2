//! 采集服务器共享领域模型。
//!
//! - [`config`]：端口 / 设备 / 寄存器配置快照（启动时加载一次，运行期只读）
//! - [`data`]：读数（Reading）与质量标记
//! - [`health`]：端口链路健康快照

pub mod config;
pub mod data;
pub mod health;

pub use config::{
    ByteOrder, DataType, DeviceConfig, LinkEndpoint, Parity, PortConfig, RegisterConfig,
    RegisterRegion, SerialSettings, StopBits, TransportKind, WordOrder,
};
pub use data::{Quality, Reading, ReadingKey, now_epoch_ms};
pub use health::{LinkHealth, LinkState};
