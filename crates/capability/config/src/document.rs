//! 配置文档的原始结构（YAML 反序列化目标）。
//!
//! 时间字段统一以秒（浮点）书写；未知字段忽略，缺省字段取默认值。

use domain::{ByteOrder, DataType, Parity, RegisterRegion, TransportKind, WordOrder};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ServerDocument {
    pub server: ServerSection,
    pub polling: PollingSection,
    pub cache: CacheSection,
    pub distribution: DistributionSection,
    pub persistence: PersistenceSection,
    pub websocket: WebSocketSection,
    pub mqtt: MqttSection,
    pub logging: LoggingSection,
    pub ports_config_file: Option<String>,
    pub ports: Option<BTreeMap<String, PortDocument>>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct ServerSection {
    pub name: String,
    pub host: String,
    pub api_port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "Modbus Server".to_string(),
            host: "127.0.0.1".to_string(),
            api_port: 8000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct PollingSection {
    pub backoff_floor: f64,
    pub backoff_ceiling: f64,
    pub restart_delay: f64,
    pub shutdown_grace: f64,
    pub connection_timeout: f64,
    pub buffer_size: usize,
    pub command_buffer: usize,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            backoff_floor: 1.0,
            backoff_ceiling: 60.0,
            restart_delay: 5.0,
            shutdown_grace: 5.0,
            connection_timeout: 10.0,
            buffer_size: 1000,
            command_buffer: 16,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct CacheSection {
    pub enabled: bool,
    pub max_size: usize,
    /// 秒；0 表示不判定过期
    pub ttl: f64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 10_000,
            ttl: 300.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct DistributionSection {
    pub cache_queue_size: usize,
    pub persist_queue_size: usize,
    pub subscriber_queue_size: usize,
    pub batch_size: usize,
    pub max_retries: usize,
    pub retry_delay: f64,
    pub drain_timeout: f64,
}

impl Default for DistributionSection {
    fn default() -> Self {
        Self {
            cache_queue_size: 1_000,
            persist_queue_size: 10_000,
            subscriber_queue_size: 1_000,
            batch_size: 100,
            max_retries: 3,
            retry_delay: 1.0,
            drain_timeout: 5.0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PersistenceSection {
    pub backend: Option<String>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub redis_ttl: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct WebSocketSection {
    pub enabled: bool,
    pub message_queue_size: usize,
}

impl Default for WebSocketSection {
    fn default() -> Self {
        Self {
            enabled: true,
            message_queue_size: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct MqttSection {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub qos: u8,
    pub retain: bool,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            topic_prefix: "mbus".to_string(),
            qos: 0,
            retain: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 端口文档：顶层为 端口名 → 端口。
pub(crate) type PortsDocument = BTreeMap<String, PortDocument>;

#[derive(Debug, Deserialize)]
pub(crate) struct PortDocument {
    #[serde(rename = "type")]
    pub transport: TransportKind,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    pub host: Option<String>,
    pub port: Option<u32>,
    pub port_name: Option<String>,
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_stopbits")]
    pub stopbits: u8,
    #[serde(default = "default_bytesize")]
    pub bytesize: u8,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    pub connect_timeout: Option<f64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    #[serde(default)]
    pub byteorder: ByteOrder,
    #[serde(default)]
    pub wordorder: WordOrder,
    #[serde(default)]
    pub coalesce_reads: bool,
    #[serde(default)]
    pub devices: Vec<DeviceDocument>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceDocument {
    pub name: String,
    pub address: u32,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
    pub timeout: Option<f64>,
    #[serde(default)]
    pub registers: Vec<RegisterDocument>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterDocument {
    #[serde(rename = "type")]
    pub region: RegisterRegion,
    pub address: u32,
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default = "default_precision")]
    pub precision: u32,
    #[serde(default = "enabled")]
    pub read_only: bool,
    pub byteorder: Option<ByteOrder>,
    pub wordorder: Option<WordOrder>,
}

fn enabled() -> bool {
    true
}

fn default_baudrate() -> u32 {
    9600
}

fn default_stopbits() -> u8 {
    1
}

fn default_bytesize() -> u8 {
    8
}

fn default_timeout() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    0.5
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_scale() -> f64 {
    1.0
}

fn default_precision() -> u32 {
    2
}
