//! 配置加载。
//!
//! 服务器文档（YAML）描述运行参数，`ports_config_file` 指向端口文档（相对服务器文档解析，
//! 缺失时回退到内联 `ports`）。加载时一次性收集全部校验错误，任何错误都阻止启动。
//!
//! 环境变量 `MBUS_CONFIG`、`MBUS_HTTP_ADDR`、`MBUS_DATABASE_URL`、`MBUS_REDIS_URL`
//! 覆盖文档中的对应值。

mod document;
mod error;
mod ports;
mod settings;

pub use error::ConfigError;
pub use settings::{
    AppConfig, CacheSettings, DEFAULT_CONFIG_PATH, DistributionSettings, EnvOverrides,
    LoggingSettings, MqttSettings, PersistenceBackend, PersistenceSettings, PollingSettings,
    ServerSettings, WebSocketSettings,
};
