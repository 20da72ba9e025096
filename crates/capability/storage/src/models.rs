//! 存储相关的数据结构
//!
//! 域类型（GpsFix、RegisterSample 等）定义在 domain；这里只补充
//! 以“行”为单位的存取结构。

use chrono::{DateTime, Utc};
use domain::{GpsFix, RegisterSample, RejectReason, StateKey, WriteReason};

/// gps_raw_history 追加行：每条入站定位恰好产生一行。
#[derive(Debug, Clone)]
pub struct GpsRawRecord {
    pub router_sn: String,
    pub fix: GpsFix,
    pub accepted: bool,
    pub reject_reason: Option<RejectReason>,
}

/// latest_state 整行（启动恢复时批量装载用）。
#[derive(Debug, Clone)]
pub struct LatestStateRecord {
    pub key: StateKey,
    pub sample: RegisterSample,
    pub updated_at: DateTime<Utc>,
}

/// history 追加行。
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub key: StateKey,
    pub sample: RegisterSample,
    pub write_reason: WriteReason,
    pub received_at: DateTime<Utc>,
}

/// retention 允许清理的表。封闭枚举，表名/时间列不接受外部字符串。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionTable {
    GpsRawHistory,
    History,
    Events,
}

impl RetentionTable {
    pub fn table(&self) -> &'static str {
        match self {
            RetentionTable::GpsRawHistory => "gps_raw_history",
            RetentionTable::History => "history",
            RetentionTable::Events => "events",
        }
    }

    /// 按哪个时间列判老化。
    pub fn column(&self) -> &'static str {
        match self {
            RetentionTable::GpsRawHistory | RetentionTable::History => "received_at",
            RetentionTable::Events => "created_at",
        }
    }
}
