//! Redis 最新值镜像

use crate::error::PersistError;
use crate::traits::ReadingSink;
use domain::Reading;
use redis::AsyncCommands;
use std::sync::Arc;

pub const DEFAULT_KEY_PREFIX: &str = "mbus:reading";

/// 每个（设备，寄存器）一个键，值为读数 JSON。
pub struct RedisReadingSink {
    client: redis::Client,
    key_prefix: String,
    ttl_seconds: Option<u64>,
}

impl RedisReadingSink {
    pub fn new(client: redis::Client, ttl_seconds: Option<u64>) -> Self {
        Self {
            client,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            ttl_seconds: ttl_seconds.filter(|ttl| *ttl > 0),
        }
    }

    pub fn connect(redis_url: &str, ttl_seconds: Option<u64>) -> Result<Self, PersistError> {
        let client = redis::Client::open(redis_url)?;
        tracing::info!(target: "mbus.storage", ttl_seconds = ?ttl_seconds, "redis mirror configured");
        Ok(Self::new(client, ttl_seconds))
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn key_for(&self, reading: &Reading) -> String {
        reading_key(&self.key_prefix, &reading.device, &reading.register)
    }
}

pub fn reading_key(prefix: &str, device: &str, register: &str) -> String {
    format!("{}:{}:{}", prefix, device, register)
}

#[async_trait::async_trait]
impl ReadingSink for RedisReadingSink {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn write(&self, reading: &Reading) -> Result<(), PersistError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let data = serde_json::to_string(reading)?;
        let key = self.key_for(reading);
        match self.ttl_seconds {
            Some(ttl) => connection.set_ex::<_, _, ()>(key, data, ttl).await?,
            None => connection.set::<_, _, ()>(key, data).await?,
        }
        Ok(())
    }

    async fn write_batch(&self, readings: &[Arc<Reading>]) -> Result<usize, PersistError> {
        if readings.is_empty() {
            return Ok(0);
        }
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let mut pipe = redis::pipe();
        for reading in readings {
            let data = serde_json::to_string(reading.as_ref())?;
            let key = self.key_for(reading);
            match self.ttl_seconds {
                Some(ttl) => pipe.set_ex(key, data, ttl).ignore(),
                None => pipe.set(key, data).ignore(),
            };
        }
        pipe.query_async::<_, ()>(&mut connection).await?;
        Ok(readings.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_per_device_register() {
        assert_eq!(
            reading_key(DEFAULT_KEY_PREFIX, "meter-1", "voltage"),
            "mbus:reading:meter-1:voltage"
        );
    }

    #[test]
    fn custom_prefix_applies_to_every_key() {
        let client = redis::Client::open("redis://127.0.0.1:6379").unwrap();
        let sink = RedisReadingSink::new(client, Some(60)).with_key_prefix("plant-a");
        let reading = Reading {
            port: "line1".to_string(),
            device: "meter-1".to_string(),
            unit_address: 1,
            register: "voltage".to_string(),
            ts_ms: 0,
            value: Some(230.0),
            raw: vec![2300],
            unit: "V".to_string(),
            quality: domain::Quality::Good,
            error: None,
        };
        assert_eq!(sink.key_for(&reading), "plant-a:meter-1:voltage");
        assert_eq!(sink.ttl_seconds, Some(60));
    }

    #[test]
    fn zero_ttl_means_no_expiry() {
        let client = redis::Client::open("redis://127.0.0.1:6379").unwrap();
        let sink = RedisReadingSink::new(client, Some(0));
        assert_eq!(sink.ttl_seconds, None);
    }
}
