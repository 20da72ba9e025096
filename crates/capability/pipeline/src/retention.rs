//! 数据老化清理：按表/时间列/水位组合做有界批次删除。
//!
//! 永不触碰 latest_state 与 gps_latest_filtered。

use cg_storage::{RetentionStore, RetentionTable, StorageError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use domain::Clock;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// retention 配置。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub gps_raw_hours: i64,
    pub history_days: i64,
    pub events_days: i64,
    pub batch_size: i64,
    pub cleanup_interval_sec: u64,
    /// 单轮单表的批次上限，防止一次清理占住太久
    pub max_batches_per_cycle: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            gps_raw_hours: 72,
            history_days: 30,
            events_days: 90,
            batch_size: 5000,
            cleanup_interval_sec: 3600,
            max_batches_per_cycle: 100,
        }
    }
}

/// 单轮清理报告。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub gps_raw: u64,
    pub history: u64,
    pub events: u64,
    /// 有表因批次上限提前收手（下一轮继续）
    pub capped: bool,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.gps_raw + self.history + self.events
    }
}

/// 一轮完整清理：每张表循环删除直到一批删不到行或达到批次上限。
pub async fn run_cleanup(
    store: &dyn RetentionStore,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> Result<CleanupReport, StorageError> {
    let mut report = CleanupReport::default();

    let plans = [
        (
            RetentionTable::GpsRawHistory,
            now - ChronoDuration::hours(config.gps_raw_hours),
        ),
        (
            RetentionTable::History,
            now - ChronoDuration::days(config.history_days),
        ),
        (
            RetentionTable::Events,
            now - ChronoDuration::days(config.events_days),
        ),
    ];

    for (table, cutoff) in plans {
        let mut total = 0u64;
        let mut batches = 0u32;
        loop {
            let deleted = store
                .delete_older_than(table, cutoff, config.batch_size)
                .await?;
            if deleted == 0 {
                break;
            }
            total += deleted;
            batches += 1;
            if batches >= config.max_batches_per_cycle {
                warn!(
                    target: "cg.retention",
                    table = table.table(),
                    batches,
                    "cleanup_batch_cap_reached"
                );
                report.capped = true;
                break;
            }
        }
        if total > 0 {
            info!(target: "cg.retention", table = table.table(), deleted = total, "rows_expired");
        }
        match table {
            RetentionTable::GpsRawHistory => report.gps_raw = total,
            RetentionTable::History => report.history = total,
            RetentionTable::Events => report.events = total,
        }
    }

    Ok(report)
}

/// 周期清理任务。启动时立刻清一轮（重启后不用等整个周期）。
pub async fn retention_loop(
    store: Arc<dyn RetentionStore>,
    config: RetentionConfig,
    clock: Arc<dyn Clock>,
) {
    info!(
        target: "cg.retention",
        interval_sec = config.cleanup_interval_sec,
        gps_raw_hours = config.gps_raw_hours,
        history_days = config.history_days,
        events_days = config.events_days,
        "retention_started"
    );
    loop {
        match run_cleanup(store.as_ref(), &config, clock.now()).await {
            Ok(report) => {
                if report.total() > 0 {
                    info!(
                        target: "cg.retention",
                        gps_raw = report.gps_raw,
                        history = report.history,
                        events = report.events,
                        capped = report.capped,
                        "cleanup_done"
                    );
                }
            }
            Err(err) => {
                error!(target: "cg.retention", error = %err, "cleanup_failed");
            }
        }
        tokio::time::sleep(Duration::from_secs(config.cleanup_interval_sec.max(1))).await;
    }
}
