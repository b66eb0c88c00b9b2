//! Handlers 模块

pub mod distribution;
pub mod health;
pub mod live;
pub mod metrics;
pub mod ports;
pub mod readings;

pub use distribution::*;
pub use health::*;
pub use live::*;
pub use metrics::*;
pub use ports::*;
pub use readings::*;
