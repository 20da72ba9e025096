//! 结构化日志初始化与进程内计数器。

use serde::Deserialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 日志配置。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "text" 或 "json"
    pub format: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
        }
    }
}

/// 日志初始化错误。
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log file path: {0}")]
    LogFile(String),
}

/// 初始化 tracing。
///
/// 返回的 guard 在进程存活期内必须被持有，否则文件日志会丢尾。
pub fn init_tracing(
    config: &LoggingConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match &config.file {
        Some(path) => {
            let path = std::path::Path::new(path);
            let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| TelemetryError::LogFile(path.display().to_string()))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            if config.format == "json" {
                let _ = fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .try_init();
            } else {
                let _ = fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .try_init();
            }
            Ok(Some(guard))
        }
        None => {
            if config.format == "json" {
                let _ = fmt().json().with_env_filter(filter).try_init();
            } else {
                let _ = fmt().with_env_filter(filter).try_init();
            }
            Ok(None)
        }
    }
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub topic_mismatch: u64,
    pub payload_errors: u64,
    pub gps_accepted: u64,
    pub gps_rejected: u64,
    pub history_written: u64,
    pub history_suppressed: u64,
    pub events_emitted: u64,
    pub queue_dropped: u64,
    pub storage_retries: u64,
    pub messages_dropped: u64,
}

/// 进程内计数器（无外部依赖的最小指标面）。
pub struct BridgeMetrics {
    messages_received: AtomicU64,
    topic_mismatch: AtomicU64,
    payload_errors: AtomicU64,
    gps_accepted: AtomicU64,
    gps_rejected: AtomicU64,
    history_written: AtomicU64,
    history_suppressed: AtomicU64,
    events_emitted: AtomicU64,
    queue_dropped: AtomicU64,
    storage_retries: AtomicU64,
    messages_dropped: AtomicU64,
}

impl BridgeMetrics {
    fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            topic_mismatch: AtomicU64::new(0),
            payload_errors: AtomicU64::new(0),
            gps_accepted: AtomicU64::new(0),
            gps_rejected: AtomicU64::new(0),
            history_written: AtomicU64::new(0),
            history_suppressed: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            queue_dropped: AtomicU64::new(0),
            storage_retries: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            topic_mismatch: self.topic_mismatch.load(Ordering::Relaxed),
            payload_errors: self.payload_errors.load(Ordering::Relaxed),
            gps_accepted: self.gps_accepted.load(Ordering::Relaxed),
            gps_rejected: self.gps_rejected.load(Ordering::Relaxed),
            history_written: self.history_written.load(Ordering::Relaxed),
            history_suppressed: self.history_suppressed.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
            storage_retries: self.storage_retries.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<BridgeMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static BridgeMetrics {
    METRICS.get_or_init(BridgeMetrics::new)
}

/// 记录收到一条 broker 消息。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录主题不匹配丢弃。
pub fn record_topic_mismatch() {
    metrics().topic_mismatch.fetch_add(1, Ordering::Relaxed);
}

/// 记录报文解析失败丢弃。
pub fn record_payload_error() {
    metrics().payload_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录 GPS 点被接受。
pub fn record_gps_accepted() {
    metrics().gps_accepted.fetch_add(1, Ordering::Relaxed);
}

/// 记录 GPS 点被拒绝。
pub fn record_gps_rejected() {
    metrics().gps_rejected.fetch_add(1, Ordering::Relaxed);
}

/// 记录 history 写入。
pub fn record_history_written() {
    metrics().history_written.fetch_add(1, Ordering::Relaxed);
}

/// 记录 history 抑制。
pub fn record_history_suppressed() {
    metrics().history_suppressed.fetch_add(1, Ordering::Relaxed);
}

/// 记录派生事件写入。
pub fn record_event_emitted() {
    metrics().events_emitted.fetch_add(1, Ordering::Relaxed);
}

/// 记录入列队列丢弃（drop_oldest 策略）。
pub fn record_queue_dropped() {
    metrics().queue_dropped.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次存储重试。
pub fn record_storage_retry() {
    metrics().storage_retries.fetch_add(1, Ordering::Relaxed);
}

/// 记录重试耗尽后的整条消息丢弃。
pub fn record_message_dropped() {
    metrics().messages_dropped.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let before = metrics().snapshot();
        record_message_received();
        record_history_written();
        let after = metrics().snapshot();
        assert_eq!(after.messages_received, before.messages_received + 1);
        assert_eq!(after.history_written, before.history_written + 1);
    }
}
