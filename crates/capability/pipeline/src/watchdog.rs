//! 在线监察：由消息到达模式合成 online/offline 迁移与寄存器失联事件。
//!
//! offline 迁移由周期扫描发现；offline→online 由消息到达路径触发
//! （见 `IngestPipeline::handle`）。watchdog 只发事件，不动订阅。

use crate::{IngestPipeline, PipelineError};
use cg_history::resolve_params;
use domain::{EventRecord, EventType};
use std::sync::Arc;
use tracing::{error, info};

impl IngestPipeline {
    /// 一次扫描：online 实体超过 router_offline_sec 无消息则转
    /// offline；带心跳的寄存器超过 stale_register_sec 无样本则报
    /// stale（每个失联期只报一次）。
    pub async fn watchdog_tick(&self) -> Result<(), PipelineError> {
        let now = self.clock().now();
        let events_cfg = self.events_config().clone();
        let mut events = Vec::new();

        {
            let mut state = self.state_mutex().lock().await;

            for (key, entry) in state.watch.iter_mut() {
                if entry.online
                    && (now - entry.last_seen).num_seconds() >= events_cfg.router_offline_sec
                {
                    entry.online = false;
                    events.push(match &key.panel {
                        None => EventRecord::for_router(
                            key.router_sn.clone(),
                            EventType::RouterOffline,
                            "online → offline",
                        ),
                        Some((equip_type, panel_id)) => EventRecord::for_panel(
                            key.router_sn.clone(),
                            equip_type.clone(),
                            *panel_id,
                            EventType::RouterOffline,
                            format!("panel_id={panel_id} online → offline"),
                        ),
                    });
                }
            }

            if events_cfg.stale_register_sec > 0 {
                // 只对目录里带心跳的寄存器报失联
                for (key, key_state) in state.history.iter_mut() {
                    if key_state.stale_reported {
                        continue;
                    }
                    let Some(last_sample) = key_state.last_sample_ts else {
                        continue;
                    };
                    let age_sec = (now - last_sample).num_seconds();
                    if age_sec < events_cfg.stale_register_sec {
                        continue;
                    }
                    let entry = self.catalog().get(&key.equip_type, key.addr);
                    let Some(params) = resolve_params(self.history_config(), key.addr, entry.as_ref())
                    else {
                        continue;
                    };
                    if params.heartbeat_sec <= 0 {
                        continue;
                    }
                    key_state.stale_reported = true;
                    events.push(EventRecord::for_panel(
                        key.router_sn.clone(),
                        key.equip_type.clone(),
                        key.panel_id,
                        EventType::StaleRegister,
                        format!("addr={} last_sample_age_sec={age_sec}", key.addr),
                    ));
                }
            }
        }

        for event in &events {
            self.emit_event(event, now).await?;
        }
        if !events.is_empty() {
            info!(target: "cg.watchdog", events = events.len(), "watchdog_events_emitted");
        }
        Ok(())
    }
}

/// 周期运行 watchdog，直到任务被取消。
pub async fn watchdog_loop(pipeline: Arc<IngestPipeline>) {
    let interval = pipeline.watchdog_interval();
    info!(target: "cg.watchdog", interval_sec = interval.as_secs(), "watchdog_started");
    loop {
        tokio::time::sleep(interval).await;
        if let Err(err) = pipeline.watchdog_tick().await {
            error!(target: "cg.watchdog", error = %err, "watchdog_tick_failed");
        }
    }
}
