//! 统一错误响应与 DTO 转换。

use api_contract::{
    ApiResponse, DistributionStatsDto, PortHealthDto, ReadingDto, SinkStatsDto,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{LinkHealth, LinkState, PortConfig, Reading};
use mbus_acquisition::WriteError;
use mbus_distribution::DistributionStats;

pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::error(code, message.into()))).into_response()
}

pub fn not_found_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::NOT_FOUND, "RESOURCE.NOT_FOUND", message)
}

pub fn unavailable_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::SERVICE_UNAVAILABLE, "SERVICE.UNAVAILABLE", message)
}

/// 写入错误 → HTTP 状态码与错误码。
pub fn write_error(err: WriteError) -> Response {
    let (status, code) = match &err {
        WriteError::UnknownPort(_)
        | WriteError::UnknownDevice(_)
        | WriteError::UnknownRegister(_) => (StatusCode::NOT_FOUND, "RESOURCE.NOT_FOUND"),
        WriteError::ReadOnly(_) => (StatusCode::FORBIDDEN, "WRITE.READ_ONLY"),
        WriteError::Encode(_) => (StatusCode::BAD_REQUEST, "INVALID.REQUEST"),
        WriteError::LinkDown(_) | WriteError::PortUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "LINK.UNAVAILABLE")
        }
        WriteError::Transport(_) => (StatusCode::BAD_GATEWAY, "LINK.TRANSPORT"),
        WriteError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "LINK.TIMEOUT"),
    };
    error_response(status, code, err.to_string())
}

pub fn reading_to_dto(reading: &Reading) -> ReadingDto {
    ReadingDto {
        port: reading.port.clone(),
        device: reading.device.clone(),
        unit_address: reading.unit_address,
        register: reading.register.clone(),
        ts_ms: reading.ts_ms,
        value: reading.value,
        raw: reading.raw.clone(),
        unit: reading.unit.clone(),
        quality: reading.quality.as_str().to_string(),
        error: reading.error.clone(),
    }
}

pub fn link_state_str(state: LinkState) -> &'static str {
    match state {
        LinkState::Connecting => "connecting",
        LinkState::Healthy => "healthy",
        LinkState::Backoff => "backoff",
        LinkState::Stopped => "stopped",
    }
}

pub fn port_health_to_dto(config: &PortConfig, health: LinkHealth) -> PortHealthDto {
    PortHealthDto {
        success_rate: health.success_rate(),
        port: health.port,
        transport: config.transport.as_str().to_string(),
        endpoint: config.endpoint.to_string(),
        enabled: config.enabled,
        devices: config.enabled_devices().count(),
        state: link_state_str(health.state).to_string(),
        consecutive_failures: health.consecutive_failures,
        last_success_ms: health.last_success_ms,
        last_error: health.last_error,
        backoff_until_ms: health.backoff_until_ms,
        total_polls: health.total_polls,
        failed_polls: health.failed_polls,
        restarts: health.restarts,
    }
}

pub fn distribution_to_dto(stats: DistributionStats) -> DistributionStatsDto {
    DistributionStatsDto {
        ingress_pending: stats.ingress_pending,
        ingress_dropped: stats.ingress_dropped,
        dispatched: stats.dispatched,
        sinks: stats
            .sinks
            .into_iter()
            .map(|sink| SinkStatsDto {
                name: sink.name,
                kind: sink.kind.as_str().to_string(),
                pending: sink.pending,
                delivered: sink.delivered,
                dropped: sink.dropped,
                failed: sink.failed,
            })
            .collect(),
    }
}
