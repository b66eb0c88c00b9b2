//! 端口链路健康状态。
//!
//! 只由所属端口的调度器修改，外部通过快照读取。

use serde::Serialize;

/// 链路状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// 调度器已启动，尚未完成一次交换
    Connecting,
    Healthy,
    /// 链路断开，等待退避结束
    Backoff,
    /// 端口未启用、已停机或发生致命错误
    Stopped,
}

/// 单个端口的健康快照。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkHealth {
    pub port: String,
    pub state: LinkState,
    pub consecutive_failures: u32,
    pub last_success_ms: Option<i64>,
    pub last_error: Option<String>,
    pub backoff_until_ms: Option<i64>,
    pub total_polls: u64,
    pub failed_polls: u64,
    pub restarts: u32,
}

impl LinkHealth {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            state: LinkState::Connecting,
            consecutive_failures: 0,
            last_success_ms: None,
            last_error: None,
            backoff_until_ms: None,
            total_polls: 0,
            failed_polls: 0,
            restarts: 0,
        }
    }

    pub fn stopped(port: impl Into<String>) -> Self {
        Self {
            state: LinkState::Stopped,
            ..Self::new(port)
        }
    }

    /// 成功率（百分比），尚无轮询时为空。
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_polls == 0 {
            return None;
        }
        let ok = self.total_polls.saturating_sub(self.failed_polls);
        Some(ok as f64 * 100.0 / self.total_polls as f64)
    }
}
