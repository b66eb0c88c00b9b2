use crate::document::{PortsDocument, ServerDocument};
use crate::error::ConfigError;
use crate::ports::{build_ports, seconds};
use domain::PortConfig;
use serde::de::DeserializeOwned;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/server.yaml";

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub name: String,
    pub http_addr: String,
}

/// 采集监督参数。
#[derive(Debug, Clone)]
pub struct PollingSettings {
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
    pub restart_delay: Duration,
    pub shutdown_grace: Duration,
    /// 端口未单独配置时的建链超时
    pub connect_timeout: Duration,
    /// 采集 → 分发入口队列容量
    pub reading_queue_size: usize,
    pub command_buffer: usize,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub max_entries: usize,
    pub stale_after: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct DistributionSettings {
    pub cache_queue_size: usize,
    pub persist_queue_size: usize,
    pub subscriber_queue_size: usize,
    pub batch_size: usize,
    pub max_retries: usize,
    pub retry_delay: Duration,
    /// 停机时等待队列清空的上限
    pub drain_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceBackend {
    None,
    Memory,
    Postgres,
    Redis,
}

#[derive(Debug, Clone)]
pub struct PersistenceSettings {
    pub backend: PersistenceBackend,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    /// Redis 最新值过期秒数，`None` 表示不过期
    pub redis_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    pub enabled: bool,
    pub buffer: usize,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub qos: u8,
    pub retain: bool,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// 启动时加载一次的完整配置快照。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 服务器配置文档路径
    pub source: PathBuf,
    pub server: ServerSettings,
    pub polling: PollingSettings,
    pub cache: CacheSettings,
    pub distribution: DistributionSettings,
    pub persistence: PersistenceSettings,
    pub websocket: WebSocketSettings,
    pub mqtt: MqttSettings,
    pub logging: LoggingSettings,
    /// 按名字排序的端口
    pub ports: Vec<PortConfig>,
    /// 非致命问题（例如端口文件缺失时回退到内联端口）
    pub warnings: Vec<String>,
}

/// 覆盖配置文档的环境变量。
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub http_addr: Option<String>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            http_addr: read_optional("MBUS_HTTP_ADDR"),
            database_url: read_optional("MBUS_DATABASE_URL"),
            redis_url: read_optional("MBUS_REDIS_URL"),
        }
    }
}

impl AppConfig {
    /// 从 `MBUS_CONFIG`（缺省 `config/server.yaml`）加载并应用环境变量覆盖。
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            read_optional("MBUS_CONFIG").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(EnvOverrides::from_env());
        Ok(config)
    }

    /// 只读取文件，不读环境变量。
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut document: ServerDocument = read_yaml(path)?;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let polling = polling(&document, &mut errors);
        let inline = document.ports.take();
        let file = document.ports_config_file.as_deref();
        let ports = match ports_document(path, file, inline, &mut warnings)? {
            Some(ports) => build_ports(ports, polling.connect_timeout, &mut errors),
            None => Vec::new(),
        };
        if ports.is_empty() && errors.is_empty() {
            warnings.push("no ports configured".to_string());
        }

        let config = Self {
            source: path.to_path_buf(),
            server: ServerSettings {
                name: document.server.name.clone(),
                http_addr: format!("{}:{}", document.server.host, document.server.api_port),
            },
            polling,
            cache: cache(&document, &mut errors),
            distribution: distribution(&document, &mut errors),
            persistence: persistence(&document, &mut errors),
            websocket: WebSocketSettings {
                enabled: document.websocket.enabled,
                buffer: document.websocket.message_queue_size.max(1),
            },
            mqtt: mqtt(&document, &mut errors),
            logging: LoggingSettings {
                level: document.logging.level.to_ascii_lowercase(),
            },
            ports,
            warnings,
        };

        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        for warning in &config.warnings {
            warn!(target: "mbus.config", path = %path.display(), "{}", warning);
        }
        info!(
            target: "mbus.config",
            path = %path.display(),
            ports = config.ports.len(),
            devices = config.ports.iter().map(|port| port.devices.len()).sum::<usize>(),
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: EnvOverrides) {
        if let Some(http_addr) = overrides.http_addr {
            self.server.http_addr = http_addr;
        }
        if let Some(database_url) = overrides.database_url {
            self.persistence.database_url = Some(database_url);
        }
        if let Some(redis_url) = overrides.redis_url {
            self.persistence.redis_url = Some(redis_url);
        }
    }

    pub fn enabled_ports(&self) -> impl Iterator<Item = &PortConfig> {
        self.ports.iter().filter(|port| port.enabled)
    }
}

fn read_yaml<T: DeserializeOwned + Default>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yml::from_str(&content).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// 端口文件相对服务器文档解析；文件不存在时回退到内联 `ports` 并记录警告。
fn ports_document(
    path: &Path,
    file: Option<&str>,
    inline: Option<PortsDocument>,
    warnings: &mut Vec<String>,
) -> Result<Option<PortsDocument>, ConfigError> {
    let Some(file) = file else {
        return Ok(inline);
    };
    let mut ports_path = PathBuf::from(file);
    if ports_path.is_relative() {
        ports_path = path.parent().unwrap_or(Path::new(".")).join(ports_path);
    }
    if !ports_path.exists() {
        warnings.push(format!(
            "ports file {} not found, using inline ports",
            ports_path.display()
        ));
        return Ok(inline);
    }
    let ports: PortsDocument = read_yaml(&ports_path)?;
    Ok(Some(ports))
}

fn polling(document: &ServerDocument, errors: &mut Vec<String>) -> PollingSettings {
    let section = &document.polling;
    let backoff_floor = seconds("polling", "backoff_floor", section.backoff_floor, 0.1, errors);
    let backoff_ceiling =
        seconds("polling", "backoff_ceiling", section.backoff_ceiling, 0.1, errors);
    if backoff_ceiling < backoff_floor {
        errors.push("polling: backoff_ceiling must not be below backoff_floor".to_string());
    }
    PollingSettings {
        backoff_floor,
        backoff_ceiling,
        restart_delay: seconds("polling", "restart_delay", section.restart_delay, 0.0, errors),
        shutdown_grace: seconds("polling", "shutdown_grace", section.shutdown_grace, 0.0, errors),
        connect_timeout: seconds(
            "polling",
            "connection_timeout",
            section.connection_timeout,
            0.1,
            errors,
        ),
        reading_queue_size: positive("polling", "buffer_size", section.buffer_size, errors),
        command_buffer: positive("polling", "command_buffer", section.command_buffer, errors),
    }
}

fn cache(document: &ServerDocument, errors: &mut Vec<String>) -> CacheSettings {
    let section = &document.cache;
    let ttl = seconds("cache", "ttl", section.ttl, 0.0, errors);
    CacheSettings {
        enabled: section.enabled,
        max_entries: positive("cache", "max_size", section.max_size, errors),
        stale_after: (!ttl.is_zero()).then_some(ttl),
    }
}

fn distribution(document: &ServerDocument, errors: &mut Vec<String>) -> DistributionSettings {
    let section = &document.distribution;
    DistributionSettings {
        cache_queue_size: positive(
            "distribution",
            "cache_queue_size",
            section.cache_queue_size,
            errors,
        ),
        persist_queue_size: positive(
            "distribution",
            "persist_queue_size",
            section.persist_queue_size,
            errors,
        ),
        subscriber_queue_size: positive(
            "distribution",
            "subscriber_queue_size",
            section.subscriber_queue_size,
            errors,
        ),
        batch_size: positive("distribution", "batch_size", section.batch_size, errors),
        max_retries: section.max_retries,
        retry_delay: seconds("distribution", "retry_delay", section.retry_delay, 0.0, errors),
        drain_timeout: seconds(
            "distribution",
            "drain_timeout",
            section.drain_timeout,
            0.0,
            errors,
        ),
    }
}

fn persistence(document: &ServerDocument, errors: &mut Vec<String>) -> PersistenceSettings {
    let section = &document.persistence;
    let backend = match section
        .backend
        .as_deref()
        .map(|backend| backend.trim().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("") | Some("none") => PersistenceBackend::None,
        Some("memory") => PersistenceBackend::Memory,
        Some("postgres") => PersistenceBackend::Postgres,
        Some("redis") => PersistenceBackend::Redis,
        Some(other) => {
            errors.push(format!(
                "persistence: unknown backend {:?} (none, memory, postgres, redis)",
                other
            ));
            PersistenceBackend::None
        }
    };
    PersistenceSettings {
        backend,
        database_url: section.database_url.clone(),
        redis_url: section.redis_url.clone(),
        redis_ttl_seconds: section.redis_ttl.filter(|ttl| *ttl > 0),
    }
}

fn mqtt(document: &ServerDocument, errors: &mut Vec<String>) -> MqttSettings {
    let section = &document.mqtt;
    if section.qos > 2 {
        errors.push(format!("mqtt: qos must be 0, 1 or 2, got {}", section.qos));
    }
    if section.enabled && section.host.trim().is_empty() {
        errors.push("mqtt: host is required when enabled".to_string());
    }
    MqttSettings {
        enabled: section.enabled,
        host: section.host.clone(),
        port: section.port,
        username: section.username.clone(),
        password: section.password.clone(),
        topic_prefix: section.topic_prefix.clone(),
        qos: section.qos,
        retain: section.retain,
    }
}

fn positive(context: &str, field: &str, value: usize, errors: &mut Vec<String>) -> usize {
    if value == 0 {
        errors.push(format!("{}: {} must be at least 1", context, field));
        return 1;
    }
    value
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}
