//! 端口状态与寄存器写入 handlers
//!
//! - GET /api/ports
//! - POST /api/ports/:port/devices/:device/registers/:register

use crate::AppState;
use crate::utils::response::{port_health_to_dto, write_error};
use api_contract::{ApiResponse, PortHealthDto, WriteRegisterRequest, WriteRegisterResponse};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::LinkHealth;
use tracing::info;

#[derive(serde::Deserialize)]
pub struct RegisterPath {
    pub(crate) port: String,
    pub(crate) device: String,
    pub(crate) register: String,
}

pub async fn list_ports(State(state): State<AppState>) -> Response {
    let data: Vec<PortHealthDto> = state
        .supervisor
        .ports()
        .iter()
        .map(|config| {
            let health = state
                .supervisor
                .port_health(&config.name)
                .unwrap_or_else(|| LinkHealth::stopped(config.name.clone()));
            port_health_to_dto(config, health)
        })
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub async fn write_register(
    State(state): State<AppState>,
    Path(path): Path<RegisterPath>,
    Json(req): Json<WriteRegisterRequest>,
) -> Response {
    if let Err(err) = state
        .supervisor
        .write_register(&path.port, &path.device, &path.register, req.value)
        .await
    {
        return write_error(err);
    }
    info!(
        target: "mbus.api",
        port = %path.port,
        device = %path.device,
        register = %path.register,
        value = req.value,
        "register written"
    );
    let data = WriteRegisterResponse {
        port: path.port,
        device: path.device,
        register: path.register,
        value: req.value,
    };
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}
