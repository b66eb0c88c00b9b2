//! 实时读数订阅者实现
//!
//! - [`BroadcastSubscriber`]：进程内广播，供 websocket 推送使用
//! - [`MqttSubscriber`]：按 `{prefix}/{port}/{device}/{register}` 发布到 MQTT

mod broadcast;
mod mqtt;

pub use broadcast::BroadcastSubscriber;
pub use mqtt::{MqttPublisherConfig, MqttSubscriber, ReadingPayload, topic_for};
