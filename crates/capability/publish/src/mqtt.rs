use async_trait::async_trait;
use domain::{Quality, Reading};
use mbus_distribution::{PublishError, ReadingSubscriber};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tracing::{debug, warn};

/// MQTT 发布配置。
#[derive(Debug, Clone)]
pub struct MqttPublisherConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub qos: u8,
    pub retain: bool,
}

impl Default for MqttPublisherConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            topic_prefix: "mbus".to_string(),
            qos: 0,
            retain: false,
        }
    }
}

/// MQTT 消息体。
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReadingPayload {
    pub ts_ms: i64,
    pub value: Option<f64>,
    pub raw: Vec<u16>,
    pub unit: String,
    pub quality: Quality,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl From<&Reading> for ReadingPayload {
    fn from(reading: &Reading) -> Self {
        Self {
            ts_ms: reading.ts_ms,
            value: reading.value,
            raw: reading.raw.clone(),
            unit: reading.unit.clone(),
            quality: reading.quality,
            error: reading.error.clone(),
        }
    }
}

/// MQTT 订阅者（发布读数）。
#[derive(Clone)]
pub struct MqttSubscriber {
    client: AsyncClient,
    topic_prefix: String,
    qos: QoS,
    retain: bool,
}

impl MqttSubscriber {
    /// 创建客户端并启动事件循环任务；事件循环出错后 1 秒重连。
    pub fn connect(config: MqttPublisherConfig) -> (Self, tokio::task::JoinHandle<()>) {
        let client_id = format!("mbus-publish-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let handle = tokio::spawn(async move {
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(target: "mbus.distribution", "mqtt eventloop error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        (
            Self {
                client,
                topic_prefix: config.topic_prefix,
                qos: qos_from_u8(config.qos),
                retain: config.retain,
            },
            handle,
        )
    }
}

#[async_trait]
impl ReadingSubscriber for MqttSubscriber {
    fn id(&self) -> &str {
        "mqtt"
    }

    async fn publish(&self, reading: &Reading) -> Result<(), PublishError> {
        let topic = topic_for(&self.topic_prefix, reading);
        let payload = serde_json::to_vec(&ReadingPayload::from(reading))
            .map_err(|err| PublishError::Serialize(err.to_string()))?;
        debug!(
            target: "mbus.distribution",
            topic = %topic,
            payload_size = payload.len(),
            "mqtt publish"
        );
        self.client
            .publish(topic, self.qos, self.retain, payload)
            .await
            .map_err(|err| PublishError::Transport(err.to_string()))
    }
}

/// `{prefix}/{port}/{device}/{register}`；名字中的主题通配符与分隔符替换为 `_`。
pub fn topic_for(prefix: &str, reading: &Reading) -> String {
    format!(
        "{}/{}/{}/{}",
        prefix.trim_end_matches('/'),
        topic_level(&reading.port),
        topic_level(&reading.device),
        topic_level(&reading.register)
    )
}

fn topic_level(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            '/' | '+' | '#' => '_',
            other => other,
        })
        .collect()
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
