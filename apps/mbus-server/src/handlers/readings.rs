//! 最新值查询 handlers
//!
//! - GET /api/readings?device=
//! - GET /api/readings/:device/:register

use crate::AppState;
use crate::utils::response::{not_found_error, reading_to_dto, unavailable_error};
use api_contract::{ApiResponse, ReadingDto};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(Debug, Default, serde::Deserialize)]
pub struct ReadingsQuery {
    pub device: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct ReadingPath {
    pub(crate) device: String,
    pub(crate) register: String,
}

pub async fn list_readings(
    State(state): State<AppState>,
    Query(query): Query<ReadingsQuery>,
) -> Response {
    let Some(cache) = state.cache.as_ref() else {
        return unavailable_error("reading cache is disabled");
    };
    let readings = match query.device.as_deref().filter(|device| !device.is_empty()) {
        Some(device) => cache.list_device(device),
        None => cache.list(),
    };
    let data: Vec<ReadingDto> = readings.iter().map(reading_to_dto).collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub async fn get_reading(State(state): State<AppState>, Path(path): Path<ReadingPath>) -> Response {
    let Some(cache) = state.cache.as_ref() else {
        return unavailable_error("reading cache is disabled");
    };
    match cache.get(&path.device, &path.register) {
        Some(reading) => {
            (StatusCode::OK, Json(ApiResponse::success(reading_to_dto(&reading)))).into_response()
        }
        None => not_found_error(format!(
            "no reading for {}/{}",
            path.device, path.register
        )),
    }
}
