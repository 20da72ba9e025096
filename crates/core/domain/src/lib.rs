pub mod data;

pub use data::{
    CatalogEntry, CatalogKey, EventRecord, EventType, GpsFix, RegisterSample, RejectReason,
    StateKey, ValueKind, WriteReason,
};

use chrono::{DateTime, Utc};

/// 时钟端口：所有策略逻辑统一经由该接口读取当前时间，测试可注入受控时钟。
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟（生产默认实现）。
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
