//! 采集服务器的 HTTP 层。
//!
//! 采集与分发在 `main` 中启动，这里只读取它们暴露的句柄：
//! - 最新值缓存查询与端口链路状态
//! - 寄存器写入（转交监督器，由所属端口串行执行）
//! - 分发统计、计数指标
//! - `/ws` 实时读数推送

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod utils;

pub use routes::create_router;
pub use state::AppState;
