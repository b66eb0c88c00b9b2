use serde::{Deserialize, Serialize};

/// 读数质量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    /// 缓存中的值超过新鲜度阈值
    Stale,
    /// 本轮读取或解码失败
    Error,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Stale => "stale",
            Self::Error => "error",
        }
    }
}

/// 缓存键：（设备名，寄存器名）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReadingKey {
    pub device: String,
    pub register: String,
}

impl ReadingKey {
    pub fn new(device: impl Into<String>, register: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            register: register.into(),
        }
    }
}

/// 一次轮询产生的寄存器读数。
///
/// 创建后不再修改，在采集与分发之间以 `Arc<Reading>` 共享。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub port: String,
    pub device: String,
    pub unit_address: u8,
    pub register: String,
    pub ts_ms: i64,
    /// 工程值；`quality == Error` 时为空
    pub value: Option<f64>,
    /// 原始寄存器字
    pub raw: Vec<u16>,
    pub unit: String,
    pub quality: Quality,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl Reading {
    pub fn key(&self) -> ReadingKey {
        ReadingKey::new(self.device.clone(), self.register.clone())
    }

    pub fn is_good(&self) -> bool {
        self.quality == Quality::Good
    }

    /// 以新的质量标记复制一份读数（用于缓存返回过期值）。
    pub fn with_quality(&self, quality: Quality) -> Self {
        Self {
            quality,
            ..self.clone()
        }
    }
}

/// 当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
