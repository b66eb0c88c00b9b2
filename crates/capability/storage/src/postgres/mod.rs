//! PostgreSQL 实现

mod readings;

pub use readings::PgReadingSink;
