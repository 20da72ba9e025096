//! 应用运行配置：YAML 文件 + 环境变量覆盖敏感项。
//!
//! 每个小节都有完整默认值，空文件也能启动；凭证可用
//! `CG_PG_PASSWORD` / `CG_MQTT_PASSWORD` 覆盖，避免落盘。

use cg_gps::GpsFilterConfig;
use cg_history::HistoryPolicyConfig;
use cg_ingest::{IngestConfig, MqttConfig};
use cg_pipeline::{EventsPolicyConfig, RetentionConfig};
use cg_storage::PostgresConfig;
use cg_telemetry::LoggingConfig;
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {0}: {1}")]
    Read(String, String),
    #[error("cannot parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// 应用运行配置。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub postgres: PostgresConfig,
    pub gps_filter: GpsFilterConfig,
    pub history_policy: HistoryPolicyConfig,
    pub events_policy: EventsPolicyConfig,
    pub retention: RetentionConfig,
    pub ingest: IngestConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从 YAML 文件加载并校验；环境变量覆盖随后生效。
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(path.display().to_string(), err.to_string()))?;
        let mut config: AppConfig =
            serde_yaml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        info!(target: "cg.config", path = %path.display(), "config_loaded");
        Ok(config)
    }

    /// 凭证类环境变量覆盖。
    pub fn apply_env_overrides(&mut self) {
        if let Ok(password) = env::var("CG_PG_PASSWORD") {
            if !password.is_empty() {
                self.postgres.password = password;
            }
        }
        if let Ok(password) = env::var("CG_MQTT_PASSWORD") {
            if !password.is_empty() {
                self.mqtt.password = Some(password);
            }
        }
    }

    /// 逻辑不可能的取值在启动前拒绝（对应 PolicyError 语义）。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_policy.default_tolerance < 0.0 {
            return Err(ConfigError::Invalid(
                "history_policy.default_tolerance must be >= 0".to_string(),
            ));
        }
        if self.history_policy.default_min_interval_sec < 0 {
            return Err(ConfigError::Invalid(
                "history_policy.default_min_interval_sec must be >= 0".to_string(),
            ));
        }
        if self.history_policy.default_heartbeat_sec < 0 {
            return Err(ConfigError::Invalid(
                "history_policy.default_heartbeat_sec must be >= 0".to_string(),
            ));
        }
        for kpi in &self.history_policy.kpi_registers {
            if kpi.tolerance < 0.0 || kpi.heartbeat_sec < 0 {
                return Err(ConfigError::Invalid(format!(
                    "kpi register addr={} has negative tolerance or heartbeat",
                    kpi.addr
                )));
            }
        }
        if self.gps_filter.max_jump_m <= 0.0 || self.gps_filter.max_speed_kmh <= 0.0 {
            return Err(ConfigError::Invalid(
                "gps_filter thresholds must be positive".to_string(),
            ));
        }
        if self.gps_filter.confirm_points == 0 {
            return Err(ConfigError::Invalid(
                "gps_filter.confirm_points must be >= 1".to_string(),
            ));
        }
        if self.ingest.worker_count == 0 {
            return Err(ConfigError::Invalid(
                "ingest.worker_count must be >= 1".to_string(),
            ));
        }
        if self.ingest.queue_max == 0 {
            return Err(ConfigError::Invalid(
                "ingest.queue_max must be >= 1".to_string(),
            ));
        }
        if self.postgres.pool_max == 0 || self.postgres.pool_max < self.postgres.pool_min {
            return Err(ConfigError::Invalid(
                "postgres pool sizing must satisfy 1 <= pool_min <= pool_max".to_string(),
            ));
        }
        if self.retention.batch_size <= 0 || self.retention.max_batches_per_cycle == 0 {
            return Err(ConfigError::Invalid(
                "retention batch sizing must be positive".to_string(),
            ));
        }
        if self.retention.gps_raw_hours <= 0
            || self.retention.history_days <= 0
            || self.retention.events_days <= 0
        {
            return Err(ConfigError::Invalid(
                "retention horizons must be positive".to_string(),
            ));
        }
        if self.events_policy.router_offline_sec <= 0 {
            return Err(ConfigError::Invalid(
                "events_policy.router_offline_sec must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
