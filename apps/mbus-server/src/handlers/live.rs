//! 实时读数推送
//!
//! - GET /ws?device=
//!
//! 每条读数以 JSON 文本帧发送。客户端处理过慢时广播通道会跳过旧读数，
//! 连接保持不断。

use crate::AppState;
use crate::utils::response::{reading_to_dto, unavailable_error};
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use domain::Reading;
use std::sync::Arc;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing::{debug, warn};

#[derive(Debug, Default, serde::Deserialize)]
pub struct LiveQuery {
    pub device: Option<String>,
}

pub async fn live_readings(
    State(state): State<AppState>,
    Query(query): Query<LiveQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(live) = state.live.as_ref() else {
        return unavailable_error("websocket streaming is disabled");
    };
    let receiver = live.subscribe();
    let device = query.device.filter(|device| !device.is_empty());
    ws.on_upgrade(move |socket| stream_readings(socket, receiver, device))
}

async fn stream_readings(
    mut socket: WebSocket,
    mut receiver: Receiver<Arc<Reading>>,
    device: Option<String>,
) {
    debug!(target: "mbus.api", device = ?device, "websocket client connected");
    loop {
        tokio::select! {
            next = receiver.recv() => match next {
                Ok(reading) => {
                    if device.as_deref().is_some_and(|device| device != reading.device) {
                        continue;
                    }
                    let text = match serde_json::to_string(&reading_to_dto(&reading)) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(target: "mbus.api", error = %err, "reading serialization failed");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(target: "mbus.api", skipped, "websocket client lagging");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(target: "mbus.api", "websocket client disconnected");
}
