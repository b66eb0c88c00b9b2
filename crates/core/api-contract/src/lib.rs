//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 服务健康摘要。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub status: String,
    pub name: String,
    pub ports: usize,
    pub ports_healthy: usize,
    pub acquisition_running: bool,
}

/// 读数返回结构（REST 与 websocket 共用）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingDto {
    pub port: String,
    pub device: String,
    pub unit_address: u8,
    pub register: String,
    pub ts_ms: i64,
    pub value: Option<f64>,
    pub raw: Vec<u16>,
    pub unit: String,
    /// good / stale / error
    pub quality: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// 端口链路状态。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortHealthDto {
    pub port: String,
    pub transport: String,
    pub endpoint: String,
    pub enabled: bool,
    pub devices: usize,
    /// connecting / healthy / backoff / stopped
    pub state: String,
    pub consecutive_failures: u32,
    pub last_success_ms: Option<i64>,
    pub last_error: Option<String>,
    pub backoff_until_ms: Option<i64>,
    pub total_polls: u64,
    pub failed_polls: u64,
    pub success_rate: Option<f64>,
    pub restarts: u32,
}

/// 寄存器写入请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRegisterRequest {
    pub value: f64,
}

/// 寄存器写入响应体。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRegisterResponse {
    pub port: String,
    pub device: String,
    pub register: String,
    pub value: f64,
}

/// 单个分发目标统计。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkStatsDto {
    pub name: String,
    /// cache / persistence / subscriber
    pub kind: String,
    pub pending: usize,
    pub delivered: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// 分发统计。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionStatsDto {
    pub ingress_pending: usize,
    pub ingress_dropped: u64,
    pub dispatched: u64,
    pub sinks: Vec<SinkStatsDto>,
}

/// 进程级计数指标。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsDto {
    pub polls: u64,
    pub poll_failures: u64,
    pub readings_good: u64,
    pub readings_error: u64,
    pub retries: u64,
    pub link_down_events: u64,
    pub writes_ok: u64,
    pub writes_failed: u64,
    pub scheduler_restarts: u64,
    pub readings_dispatched: u64,
    pub readings_dropped_ingress: u64,
    pub readings_dropped_sink: u64,
    pub persist_failures: u64,
    pub publish_failures: u64,
    pub avg_poll_latency_ms: Option<f64>,
}
