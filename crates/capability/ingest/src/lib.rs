//! broker 接入：MQTT 订阅、主题文法、报文类型与入列队列。

pub mod payload;
pub mod queue;
pub mod topic;

pub use payload::{DecodedPayload, GpsBlock, RegisterPayload, TelemetryPayload, parse_iso8601};
pub use queue::{IngestQueue, PushOutcome};
pub use topic::{Topic, parse_topic};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("broker error: {0}")]
    Broker(String),
    #[error("sink error: {0}")]
    Sink(String),
    /// 下游已关闭（停机中），源应当退出。
    #[error("sink closed")]
    Closed,
}

/// 从 broker 收到的原始消息。
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

/// 消息接收端抽象：broker 回调把消息交给它（通常是入列）。
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: InboundMessage) -> Result<(), IngestError>;
}

/// MQTT 连接配置。
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
    pub client_id: String,
    pub keepalive_sec: u64,
    pub topic_gps: String,
    pub topic_decoded: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            tls: false,
            client_id: "cg-bridge".to_string(),
            keepalive_sec: 60,
            topic_gps: "cg/v1/telemetry/SN/+".to_string(),
            topic_decoded: "cg/v1/decoded/SN/+/pcc/+".to_string(),
        }
    }
}

/// 入列与 worker 配置。
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub queue_max: usize,
    pub worker_count: usize,
    pub op_timeout_sec: u64,
    pub op_retries: u32,
    pub drop_oldest: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_max: 10_000,
            worker_count: 1,
            op_timeout_sec: 10,
            op_retries: 3,
            drop_oldest: false,
        }
    }
}

// 重连退避序列（秒），到顶封顶
const RECONNECT_DELAYS_SEC: [u64; 5] = [1, 2, 5, 10, 30];

#[derive(Debug, Default)]
struct Backoff {
    step: usize,
}

impl Backoff {
    fn next(&mut self) -> Duration {
        let delay = RECONNECT_DELAYS_SEC[self.step.min(RECONNECT_DELAYS_SEC.len() - 1)];
        self.step += 1;
        Duration::from_secs(delay)
    }

    fn reset(&mut self) {
        self.step = 0;
    }
}

/// MQTT 采集源：订阅两类主题，QoS 至少一次，断线指数退避重连。
pub struct MqttSource {
    config: MqttConfig,
    clock: Arc<dyn Clock>,
}

impl MqttSource {
    pub fn new(config: MqttConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    /// 运行直到下游关闭。连接失败只记日志并退避重试，永不 panic。
    pub async fn run(&self, sink: Arc<dyn MessageSink>) {
        let mut backoff = Backoff::default();
        loop {
            match self.connect_and_poll(&sink, &mut backoff).await {
                Ok(()) => {
                    info!(target: "cg.ingest", "mqtt source stopped: sink closed");
                    return;
                }
                Err(err) => {
                    let delay = backoff.next();
                    warn!(
                        target: "cg.ingest",
                        error = %err,
                        delay_sec = delay.as_secs(),
                        "mqtt_connection_lost"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn connect_and_poll(
        &self,
        sink: &Arc<dyn MessageSink>,
        backoff: &mut Backoff,
    ) -> Result<(), IngestError> {
        let config = &self.config;
        let mut options =
            rumqttc::MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keepalive_sec));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }
        if config.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }

        let (client, mut eventloop) = rumqttc::AsyncClient::new(options, 64);
        client
            .subscribe(config.topic_gps.clone(), rumqttc::QoS::AtLeastOnce)
            .await
            .map_err(|err| IngestError::Broker(err.to_string()))?;
        client
            .subscribe(config.topic_decoded.clone(), rumqttc::QoS::AtLeastOnce)
            .await
            .map_err(|err| IngestError::Broker(err.to_string()))?;

        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    info!(
                        target: "cg.ingest",
                        host = %config.host,
                        port = config.port,
                        gps = %config.topic_gps,
                        decoded = %config.topic_decoded,
                        "mqtt_connected"
                    );
                    backoff.reset();
                }
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                        received_at: self.clock.now(),
                    };
                    match sink.deliver(message).await {
                        Ok(()) => {}
                        Err(IngestError::Closed) => return Ok(()),
                        Err(err) => {
                            warn!(target: "cg.ingest", error = %err, "message_delivery_failed");
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => return Err(IngestError::Broker(err.to_string())),
            }
        }
    }
}
