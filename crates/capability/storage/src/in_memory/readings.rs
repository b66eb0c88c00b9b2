use crate::error::PersistError;
use crate::traits::ReadingSink;
use domain::Reading;
use std::sync::RwLock;

/// 读数内存存储
#[derive(Default)]
pub struct InMemoryReadingSink {
    readings: RwLock<Vec<Reading>>,
}

impl InMemoryReadingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已写入的读数（按写入顺序）
    pub fn readings(&self) -> Vec<Reading> {
        self.readings
            .read()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.readings.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ReadingSink for InMemoryReadingSink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write(&self, reading: &Reading) -> Result<(), PersistError> {
        let mut readings = self
            .readings
            .write()
            .map_err(|_| PersistError::Unavailable("lock failed".to_string()))?;
        readings.push(reading.clone());
        Ok(())
    }
}

/// 丢弃所有读数。
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait::async_trait]
impl ReadingSink for NoopSink {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn write(&self, _reading: &Reading) -> Result<(), PersistError> {
        Ok(())
    }
}
