//! 路由定义
//!
//! - 健康检查：/health
//! - 端口状态：/api/ports
//! - 缓存查询：/api/readings, /api/readings/:device/:register
//! - 寄存器写入：/api/ports/:port/devices/:device/registers/:register
//! - 统计：/api/distribution, /api/metrics
//! - 实时推送：/ws

use crate::AppState;
use crate::handlers::*;
use crate::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// 创建完整路由并注入状态。
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ports", get(list_ports))
        .route("/api/readings", get(list_readings))
        .route("/api/readings/:device/:register", get(get_reading))
        .route(
            "/api/ports/:port/devices/:device/registers/:register",
            post(write_register),
        )
        .route("/api/distribution", get(get_distribution))
        .route("/api/metrics", get(get_metrics))
        .route("/ws", get(live_readings))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_context))
                .layer(TraceLayer::new_for_http()),
        )
}
