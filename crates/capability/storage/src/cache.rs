//! 最新值缓存

use domain::{Quality, Reading, ReadingKey, now_epoch_ms};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// 缓存参数。
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 最多保留的（设备，寄存器）条目数
    pub max_entries: usize,
    /// 超过该时长未刷新的 `good` 读数按 `stale` 返回；`None` 表示不判定过期
    pub stale_after: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            stale_after: Some(Duration::from_secs(60)),
        }
    }
}

/// 每个（设备，寄存器）只保留最新一条读数。
///
/// 单写多读：只有分发层的缓存工作任务调用 [`ReadingCache::update`]。
pub struct ReadingCache {
    entries: RwLock<HashMap<ReadingKey, Arc<Reading>>>,
    max_entries: usize,
    stale_after: Option<Duration>,
}

impl ReadingCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: config.max_entries.max(1),
            stale_after: config.stale_after,
        }
    }

    /// 覆盖写入；新键超出容量时淘汰时间戳最旧的条目。返回是否发生淘汰。
    pub fn update(&self, reading: Arc<Reading>) -> bool {
        let key = reading.key();
        let mut entries = self.write();
        if let Some(existing) = entries.get_mut(&key) {
            *existing = reading;
            return false;
        }
        let mut evicted = false;
        if entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, reading)| reading.ts_ms)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                evicted = true;
            }
        }
        entries.insert(key, reading);
        evicted
    }

    pub fn get(&self, device: &str, register: &str) -> Option<Reading> {
        self.get_at(device, register, now_epoch_ms())
    }

    pub fn get_at(&self, device: &str, register: &str, now_ms: i64) -> Option<Reading> {
        let key = ReadingKey::new(device, register);
        self.read()
            .get(&key)
            .map(|reading| self.present(reading, now_ms))
    }

    /// 全部最新读数，按（设备，寄存器）排序。
    pub fn list(&self) -> Vec<Reading> {
        self.list_at(now_epoch_ms())
    }

    pub fn list_at(&self, now_ms: i64) -> Vec<Reading> {
        let mut readings: Vec<Reading> = self
            .read()
            .values()
            .map(|reading| self.present(reading, now_ms))
            .collect();
        readings.sort_by(|a, b| (&a.device, &a.register).cmp(&(&b.device, &b.register)));
        readings
    }

    pub fn list_device(&self, device: &str) -> Vec<Reading> {
        let now_ms = now_epoch_ms();
        let mut readings: Vec<Reading> = self
            .read()
            .values()
            .filter(|reading| reading.device == device)
            .map(|reading| self.present(reading, now_ms))
            .collect();
        readings.sort_by(|a, b| a.register.cmp(&b.register));
        readings
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn present(&self, reading: &Reading, now_ms: i64) -> Reading {
        match self.stale_after {
            Some(stale_after)
                if reading.quality == Quality::Good
                    && now_ms.saturating_sub(reading.ts_ms) > stale_after.as_millis() as i64 =>
            {
                reading.with_quality(Quality::Stale)
            }
            _ => reading.clone(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ReadingKey, Arc<Reading>>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ReadingKey, Arc<Reading>>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
