use crate::AppState;
use crate::utils::response::distribution_to_dto;
use api_contract::ApiResponse;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /api/distribution
pub async fn get_distribution(State(state): State<AppState>) -> Response {
    let stats = distribution_to_dto(state.distribution.stats());
    (StatusCode::OK, Json(ApiResponse::success(stats))).into_response()
}
