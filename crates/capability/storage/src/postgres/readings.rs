//! Postgres 时序写入实现

use crate::error::PersistError;
use crate::traits::ReadingSink;
use domain::Reading;
use sqlx::PgPool;
use std::sync::Arc;

const CREATE_TABLE: &str = "create table if not exists readings (\
     id bigserial primary key, \
     port text not null, \
     device text not null, \
     unit_address smallint not null, \
     register text not null, \
     ts timestamptz not null, \
     value double precision, \
     raw integer[] not null, \
     unit text not null, \
     quality text not null, \
     error text)";

const CREATE_INDEX: &str =
    "create index if not exists readings_device_register_ts on readings (device, register, ts desc)";

const INSERT: &str = "insert into readings \
     (port, device, unit_address, register, ts, value, raw, unit, quality, error) \
     values ($1, $2, $3, $4, to_timestamp($5 / 1000.0), $6, $7, $8, $9, $10)";

pub struct PgReadingSink {
    pub pool: PgPool,
}

impl PgReadingSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, PersistError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }

    /// 建表（幂等）。
    pub async fn ensure_schema(&self) -> Result<(), PersistError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        tracing::info!(target: "mbus.storage", table = "readings", "schema ready");
        Ok(())
    }
}

fn raw_words(reading: &Reading) -> Vec<i32> {
    reading.raw.iter().map(|word| i32::from(*word)).collect()
}

#[async_trait::async_trait]
impl ReadingSink for PgReadingSink {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn write(&self, reading: &Reading) -> Result<(), PersistError> {
        sqlx::query(INSERT)
            .bind(&reading.port)
            .bind(&reading.device)
            .bind(i16::from(reading.unit_address))
            .bind(&reading.register)
            .bind(reading.ts_ms as f64)
            .bind(reading.value)
            .bind(raw_words(reading))
            .bind(&reading.unit)
            .bind(reading.quality.as_str())
            .bind(&reading.error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn write_batch(&self, readings: &[Arc<Reading>]) -> Result<usize, PersistError> {
        if readings.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for reading in readings {
            sqlx::query(INSERT)
                .bind(&reading.port)
                .bind(&reading.device)
                .bind(i16::from(reading.unit_address))
                .bind(&reading.register)
                .bind(reading.ts_ms as f64)
                .bind(reading.value)
                .bind(raw_words(reading))
                .bind(&reading.unit)
                .bind(reading.quality.as_str())
                .bind(&reading.error)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(readings.len())
    }
}
