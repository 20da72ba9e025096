//! 管线的全部内存状态。
//!
//! 由 supervisor 经 [`crate::IngestPipeline`] 持有，单把锁守护；
//! ingest worker 在短临界区内做纯判定，watchdog 以快照方式读取。
//! 分区 worker 下同一 router_sn 始终落在同一 worker，键级状态
//! 不存在并发写。

use cg_gps::GpsFilter;
use cg_history::KeyState;
use chrono::{DateTime, Utc};
use domain::{RejectReason, StateKey};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// watchdog 监视实体：对象本身，或对象下的某面板。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub router_sn: String,
    /// None 为对象级；Some((equip_type, panel_id)) 为面板级
    pub panel: Option<(String, i32)>,
}

impl WatchKey {
    pub fn router(router_sn: impl Into<String>) -> Self {
        Self {
            router_sn: router_sn.into(),
            panel: None,
        }
    }

    pub fn panel(router_sn: impl Into<String>, equip_type: impl Into<String>, panel_id: i32) -> Self {
        Self {
            router_sn: router_sn.into(),
            panel: Some((equip_type.into(), panel_id)),
        }
    }
}

/// 监视实体的在线状态。首次出现即 online。
#[derive(Debug, Clone)]
pub struct WatchEntry {
    pub last_seen: DateTime<Utc>,
    pub online: bool,
}

#[derive(Default)]
pub(crate) struct PipelineState {
    /// router_sn → GPS 过滤器
    pub gps: HashMap<String, GpsFilter>,
    /// 行键 → 落库策略状态
    pub history: HashMap<StateKey, KeyState>,
    /// watchdog 的 last-seen 与在线标记
    pub watch: HashMap<WatchKey, WatchEntry>,
    /// 已上报过 unknown_register 的键（去事件风暴）
    pub unknown_reported: HashSet<StateKey>,
    /// (router_sn, 质量类拒因) → 上次发事件时间（每分钟限一条）
    pub quality_event_at: HashMap<(String, RejectReason), DateTime<Utc>>,
}

impl PipelineState {
    /// 消息到达：刷新 last-seen；若实体此前离线，返回 true（需要
    /// 发 router_online 事件）。
    pub fn note_arrival(&mut self, key: WatchKey, now: DateTime<Utc>) -> bool {
        match self.watch.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.last_seen = now;
                if !entry.online {
                    entry.online = true;
                    return true;
                }
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(WatchEntry {
                    last_seen: now,
                    online: true,
                });
                false
            }
        }
    }

    /// 质量类 GPS 拒绝事件限频：窗口外返回 true 并推进窗口。
    pub fn quality_event_due(
        &mut self,
        router_sn: &str,
        reason: RejectReason,
        now: DateTime<Utc>,
        window_sec: i64,
    ) -> bool {
        let key = (router_sn.to_string(), reason);
        let due = match self.quality_event_at.get(&key) {
            Some(last) => (now - *last).num_seconds() >= window_sec,
            None => true,
        };
        if due {
            self.quality_event_at.insert(key, now);
        }
        due
    }
}
