//! 进程级计数指标快照。
//!
//! - GET /api/metrics

use api_contract::{ApiResponse, MetricsDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mbus_telemetry::metrics;

pub async fn get_metrics() -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsDto {
            polls: snapshot.polls,
            poll_failures: snapshot.poll_failures,
            readings_good: snapshot.readings_good,
            readings_error: snapshot.readings_error,
            retries: snapshot.retries,
            link_down_events: snapshot.link_down_events,
            writes_ok: snapshot.writes_ok,
            writes_failed: snapshot.writes_failed,
            scheduler_restarts: snapshot.scheduler_restarts,
            readings_dispatched: snapshot.readings_dispatched,
            readings_dropped_ingress: snapshot.readings_dropped_ingress,
            readings_dropped_sink: snapshot.readings_dropped_sink,
            persist_failures: snapshot.persist_failures,
            publish_failures: snapshot.publish_failures,
            avg_poll_latency_ms: snapshot.avg_poll_latency_ms(),
        })),
    )
        .into_response()
}
