use crate::AppState;
use api_contract::{ApiResponse, HealthDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::LinkState;

/// GET /health
///
/// 所有端口运行器都已结束时返回 503。
pub async fn health(State(state): State<AppState>) -> Response {
    let health = state.supervisor.health();
    let running = !state.supervisor.is_finished();
    let ports_healthy = health
        .iter()
        .filter(|port| port.state == LinkState::Healthy)
        .count();
    let status = if !running {
        "stopped"
    } else if ports_healthy == health.len() {
        "ok"
    } else {
        "degraded"
    };
    let code = if running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthDto {
        status: status.to_string(),
        name: state.name.clone(),
        ports: health.len(),
        ports_healthy,
        acquisition_running: running,
    };
    (code, Json(ApiResponse::success(body))).into_response()
}
