//! # 链路传输能力模块
//!
//! 一个物理端口对应一条链路，支持三种传输：
//! - **Modbus TCP**：MBAP 报文头，长连接
//! - **RTU over TCP**：RTU 帧（含 CRC）经串口服务器透传
//! - **RTU 串口**：独占串口句柄，每次请求前保持 3.5 字符的帧间静默
//!
//! ## 架构设计
//!
//! ```text
//! PortConfig.transport
//!       │
//!       ▼
//! ModbusTransportFactory
//!       │
//!       ▼
//! Box<dyn LinkTransport>  ← 由端口调度器独占（&mut self，同一时刻只有一个请求）
//!       │
//!       └── ModbusLink（tokio-modbus 上下文，惰性建链，失败后丢弃并在下次请求时重连）
//! ```

mod error;
mod link;
mod serial;
mod transport;

pub use error::TransportError;
pub use link::ModbusLink;
pub use serial::frame_gap;
pub use transport::{LinkTransport, ModbusTransportFactory, TransportFactory};
