//! 摄取决策管线
//!
//! 连接消息入口与持久化端口：解析主题与报文，驱动 GPS 过滤器与
//! history 落库策略，维护 watchdog 所需的 last-seen 状态，并产出
//! 派生事件。判定全部为短临界区内的纯内存计算；存储调用带
//! 每操作超时与有界重试。
//!
//! 写序约束：latest_state 永远先于关联的 history 行写入，事件随后。
//! 崩溃只会留下"领先"的 latest_state，不会留下孤儿 history。

pub mod retention;
pub mod state;
pub mod watchdog;

pub use retention::{CleanupReport, RetentionConfig, retention_loop, run_cleanup};
pub use state::{WatchEntry, WatchKey};
pub use watchdog::watchdog_loop;

use cg_gps::GpsFilterConfig;
use cg_history::{HistoryPolicyConfig, decide, resolve_params};
use cg_ingest::{DecodedPayload, InboundMessage, IngestConfig, TelemetryPayload, Topic, parse_topic};
use cg_storage::{
    CatalogCache, EventStore, GpsRawRecord, GpsStore, HistoryStore, ObjectStore, StateStore,
    StorageError,
};
use cg_telemetry::{
    record_gps_accepted, record_gps_rejected, record_history_suppressed, record_history_written,
    record_event_emitted, record_message_received, record_payload_error, record_storage_retry,
    record_topic_mismatch,
};
use chrono::{DateTime, Utc};
use domain::{Clock, EventRecord, EventType, RejectReason, StateKey};
use serde::Deserialize;
use serde_json::json;
use state::PipelineState;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 所有报文里的面板都是 pcc 类型；其他设备类型从目录维度预留。
const EQUIP_TYPE_PCC: &str = "pcc";

/// low_sats / bad_fix 事件的限频窗口（每对象每拒因一分钟一条）。
const QUALITY_EVENT_WINDOW_SEC: i64 = 60;

/// 事件策略配置。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsPolicyConfig {
    pub router_offline_sec: i64,
    pub stale_register_sec: i64,
    pub watchdog_interval_sec: u64,
    pub enable_gps_reject_events: bool,
    pub enable_unknown_register_events: bool,
}

impl Default for EventsPolicyConfig {
    fn default() -> Self {
        Self {
            router_offline_sec: 300,
            stale_register_sec: 3600,
            watchdog_interval_sec: 30,
            enable_gps_reject_events: true,
            enable_unknown_register_events: true,
        }
    }
}

/// 管线错误：目前只有存储失败会向上传播，判定本身不抛错。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PipelineError {
    /// 致命错误（模式/约束类）要求 supervisor 停机。
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Storage(err) => !err.is_transient(),
        }
    }
}

/// 管线依赖的持久化端口集合。
#[derive(Clone)]
pub struct PipelineStores {
    pub objects: Arc<dyn ObjectStore>,
    pub gps: Arc<dyn GpsStore>,
    pub state: Arc<dyn StateStore>,
    pub history: Arc<dyn HistoryStore>,
    pub events: Arc<dyn EventStore>,
}

/// 热重启恢复报告。
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreReport {
    pub gps_objects: usize,
    pub register_keys: usize,
}

/// 摄取管线：拥有全部内存状态，worker 逐条喂消息。
pub struct IngestPipeline {
    stores: PipelineStores,
    catalog: Arc<CatalogCache>,
    clock: Arc<dyn Clock>,
    gps_cfg: GpsFilterConfig,
    history_cfg: HistoryPolicyConfig,
    events_cfg: EventsPolicyConfig,
    op_timeout: Duration,
    op_retries: u32,
    state: tokio::sync::Mutex<PipelineState>,
}

impl IngestPipeline {
    pub fn new(
        stores: PipelineStores,
        catalog: Arc<CatalogCache>,
        clock: Arc<dyn Clock>,
        gps_cfg: GpsFilterConfig,
        history_cfg: HistoryPolicyConfig,
        events_cfg: EventsPolicyConfig,
        ingest_cfg: &IngestConfig,
    ) -> Self {
        Self {
            stores,
            catalog,
            clock,
            gps_cfg,
            history_cfg,
            events_cfg,
            op_timeout: Duration::from_secs(ingest_cfg.op_timeout_sec.max(1)),
            op_retries: ingest_cfg.op_retries,
            state: tokio::sync::Mutex::new(PipelineState::default()),
        }
    }

    pub fn events_config(&self) -> &EventsPolicyConfig {
        &self.events_cfg
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.events_cfg.watchdog_interval_sec.max(1))
    }

    /// 启动时从 gps_latest_filtered / latest_state 恢复内存状态。
    /// 心跳锚点重置为恢复时刻：重启不触发补写心跳。
    pub async fn restore(&self) -> Result<RestoreReport, StorageError> {
        let now = self.clock.now();
        let gps_latest = self.stores.gps.load_gps_latest_all().await?;
        let latest_state = self.stores.state.load_latest_state_all().await?;

        let mut state = self.state.lock().await;
        let gps_objects = gps_latest.len();
        for (router_sn, fix) in gps_latest {
            state.gps.entry(router_sn).or_default().set_initial(fix);
        }
        let register_keys = latest_state.len();
        for record in latest_state {
            let key_state = state.history.entry(record.key).or_default();
            key_state.last_value = record.sample.value;
            key_state.last_raw = record.sample.raw;
            key_state.last_text = record.sample.text.clone();
            key_state.last_reason = record.sample.reason.clone();
            key_state.last_stored_ts = Some(record.updated_at);
            key_state.last_heartbeat_ts = Some(now);
            key_state.last_sample_ts = Some(record.updated_at);
        }
        info!(
            target: "cg.ingest",
            gps_objects,
            register_keys,
            "state_restored"
        );
        Ok(RestoreReport {
            gps_objects,
            register_keys,
        })
    }

    /// 处理一条 broker 消息。解析失败只计数并丢弃；存储失败向上
    /// 传播，由 worker 决定丢弃或停机。
    pub async fn handle(&self, message: InboundMessage) -> Result<(), PipelineError> {
        record_message_received();
        let Some(topic) = parse_topic(&message.topic) else {
            record_topic_mismatch();
            debug!(target: "cg.ingest", topic = %message.topic, "topic_mismatch");
            return Ok(());
        };
        let now = self.clock.now();

        // last-seen 与 offline→online 迁移不依赖报文可解析
        let mut online_events = Vec::new();
        {
            let mut state = self.state.lock().await;
            if state.note_arrival(WatchKey::router(topic.router_sn()), now) {
                online_events.push(EventRecord::for_router(
                    topic.router_sn(),
                    EventType::RouterOnline,
                    "offline → online",
                ));
            }
            if let Topic::Decoded {
                router_sn,
                panel_id,
            } = &topic
            {
                let key = WatchKey::panel(router_sn.clone(), EQUIP_TYPE_PCC, *panel_id);
                if state.note_arrival(key, now) {
                    online_events.push(EventRecord::for_panel(
                        router_sn.clone(),
                        EQUIP_TYPE_PCC,
                        *panel_id,
                        EventType::RouterOnline,
                        format!("panel_id={panel_id} offline → online"),
                    ));
                }
            }
        }
        for event in &online_events {
            self.emit_event(event, now).await?;
        }

        match &topic {
            Topic::Telemetry { router_sn } => {
                self.handle_telemetry(router_sn, &message, now).await
            }
            Topic::Decoded {
                router_sn,
                panel_id,
            } => self.handle_decoded(router_sn, *panel_id, &message, now).await,
        }
    }

    async fn handle_telemetry(
        &self,
        router_sn: &str,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let payload: TelemetryPayload = match serde_json::from_slice(&message.payload) {
            Ok(payload) => payload,
            Err(err) => {
                record_payload_error();
                warn!(target: "cg.ingest", router_sn, error = %err, "telemetry_payload_invalid");
                return Ok(());
            }
        };
        let Some(gps) = payload.gps else {
            debug!(target: "cg.gps", router_sn, "telemetry_without_gps");
            return Ok(());
        };
        let fix = gps.to_fix(message.received_at);

        // 纯判定段：过滤器状态迁移 + 事件决定
        let (verdict, events) = {
            let mut state = self.state.lock().await;
            let filter = state.gps.entry(router_sn.to_string()).or_default();
            let verdict = filter.check(&self.gps_cfg, &fix);

            let mut events = Vec::new();
            if let Some(reason) = verdict.reject_reason {
                match reason {
                    RejectReason::JumpDistance | RejectReason::JumpSpeed => {
                        if self.events_cfg.enable_gps_reject_events {
                            events.push(
                                EventRecord::for_router(
                                    router_sn,
                                    EventType::GpsJumpRejected,
                                    format!(
                                        "reason={} lat={:.6} lon={:.6}",
                                        reason.as_str(),
                                        fix.lat,
                                        fix.lon
                                    ),
                                )
                                .with_payload(json!({
                                    "lat": fix.lat,
                                    "lon": fix.lon,
                                    "reject_reason": reason.as_str(),
                                    "satellites": fix.satellites,
                                })),
                            );
                        }
                    }
                    RejectReason::LowSats => {
                        if state.quality_event_due(router_sn, reason, now, QUALITY_EVENT_WINDOW_SEC)
                        {
                            events.push(
                                EventRecord::for_router(
                                    router_sn,
                                    EventType::GpsLowSats,
                                    format!("satellites={:?}", fix.satellites),
                                )
                                .with_payload(json!({ "satellites": fix.satellites })),
                            );
                        }
                    }
                    RejectReason::BadFix => {
                        if state.quality_event_due(router_sn, reason, now, QUALITY_EVENT_WINDOW_SEC)
                        {
                            events.push(
                                EventRecord::for_router(
                                    router_sn,
                                    EventType::GpsBadFix,
                                    format!("fix_status={:?}", fix.fix_status),
                                )
                                .with_payload(json!({ "fix_status": fix.fix_status })),
                            );
                        }
                    }
                }
            }
            (verdict, events)
        };

        if verdict.accepted {
            record_gps_accepted();
        } else {
            record_gps_rejected();
        }

        self.with_retry("upsert_object", || {
            self.stores.objects.upsert_object(router_sn, now)
        })
        .await?;

        // 每条入站定位恰好一行 raw
        let record = GpsRawRecord {
            router_sn: router_sn.to_string(),
            fix: fix.clone(),
            accepted: verdict.accepted,
            reject_reason: verdict.reject_reason,
        };
        self.with_retry("insert_gps_raw", || self.stores.gps.insert_gps_raw(&record))
            .await?;

        if verdict.accepted {
            self.with_retry("upsert_gps_latest", || {
                self.stores.gps.upsert_gps_latest(router_sn, &fix)
            })
            .await?;
        }
        for event in &events {
            self.emit_event(event, now).await?;
        }

        debug!(
            target: "cg.gps",
            router_sn,
            accepted = verdict.accepted,
            reason = ?verdict.reject_reason.map(|reason| reason.as_str()),
            lat = fix.lat,
            lon = fix.lon,
            "gps_fix_handled"
        );
        Ok(())
    }

    async fn handle_decoded(
        &self,
        router_sn: &str,
        panel_id: i32,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let payload: DecodedPayload = match serde_json::from_slice(&message.payload) {
            Ok(payload) => payload,
            Err(err) => {
                record_payload_error();
                warn!(target: "cg.ingest", router_sn, panel_id, error = %err, "decoded_payload_invalid");
                return Ok(());
            }
        };
        let sample_ts = payload.sample_time();
        let Some(registers) = payload.registers else {
            warn!(target: "cg.ingest", router_sn, panel_id, "decoded_without_registers");
            return Ok(());
        };

        self.with_retry("upsert_object", || {
            self.stores.objects.upsert_object(router_sn, now)
        })
        .await?;
        self.with_retry("upsert_equipment", || {
            self.stores
                .objects
                .upsert_equipment(router_sn, EQUIP_TYPE_PCC, panel_id, now)
        })
        .await?;

        let mut written = 0usize;
        for register in &registers {
            let Some((addr, mut sample)) = register.to_sample(sample_ts) else {
                warn!(target: "cg.ingest", router_sn, panel_id, "register_without_addr");
                continue;
            };
            let key = StateKey::new(router_sn, EQUIP_TYPE_PCC, panel_id, addr);
            let entry = self.catalog.get(EQUIP_TYPE_PCC, addr);
            if let Some(entry) = &entry {
                // 报文缺名称/单位时用目录默认值补齐
                if sample.name.is_none() {
                    sample.name = entry.name_default.clone();
                }
                if sample.unit.is_none() {
                    sample.unit = entry.unit_default.clone();
                }
            }
            let params = resolve_params(&self.history_cfg, addr, entry.as_ref());

            // 纯判定段：策略状态迁移 + 事件决定
            let (write_reason, unknown_event) = {
                let mut state = self.state.lock().await;
                match &params {
                    Some(effective) => {
                        let key_state = state.history.entry(key.clone()).or_default();
                        key_state.note_sample(now);
                        let decision = decide(effective, key_state, &sample, now);
                        if decision.is_some() {
                            key_state.note_write(&sample, now);
                        }
                        (decision, None)
                    }
                    None => {
                        let key_state = state.history.entry(key.clone()).or_default();
                        key_state.note_sample(now);
                        let mut unknown_event = None;
                        if self.events_cfg.enable_unknown_register_events
                            && state.unknown_reported.insert(key.clone())
                        {
                            unknown_event = Some(
                                EventRecord::for_panel(
                                    router_sn,
                                    EQUIP_TYPE_PCC,
                                    panel_id,
                                    EventType::UnknownRegister,
                                    format!("addr={addr} not in catalog"),
                                )
                                .with_payload(json!({ "addr": addr })),
                            );
                        }
                        (None, unknown_event)
                    }
                }
            };

            // latest_state 每条观测都覆盖写，且先于 history
            self.with_retry("upsert_latest_state", || {
                self.stores.state.upsert_latest_state(&key, &sample, now)
            })
            .await?;

            match write_reason {
                Some(reason) => {
                    self.with_retry("insert_history", || {
                        self.stores.history.insert_history(&key, &sample, reason, now)
                    })
                    .await?;
                    record_history_written();
                    written += 1;
                }
                None => record_history_suppressed(),
            }

            if let Some(event) = &unknown_event {
                self.emit_event(event, now).await?;
            }
        }

        debug!(
            target: "cg.history",
            router_sn,
            panel_id,
            registers = registers.len(),
            written,
            "decoded_handled"
        );
        Ok(())
    }

    pub(crate) async fn emit_event(
        &self,
        event: &EventRecord,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        self.with_retry("insert_event", || self.stores.events.insert_event(event, now))
            .await?;
        record_event_emitted();
        Ok(())
    }

    /// 带超时与有界重试地执行一个存储操作。只重试瞬时错误；
    /// 致命错误立即向上传播。
    async fn with_retry<T, F, Fut>(&self, op_name: &'static str, op: F) -> Result<T, PipelineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = tokio::time::timeout(self.op_timeout, op()).await;
            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if !err.is_transient() => return Err(err.into()),
                Ok(Err(err)) => err,
                Err(_) => StorageError::transient(format!("{op_name} timed out")),
            };
            if attempt >= self.op_retries {
                return Err(err.into());
            }
            attempt += 1;
            record_storage_retry();
            warn!(target: "cg.ingest", op = op_name, attempt, error = %err, "storage_retry");
            tokio::time::sleep(Duration::from_millis(500u64 << attempt.min(4))).await;
        }
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn state_mutex(&self) -> &tokio::sync::Mutex<PipelineState> {
        &self.state
    }

    pub(crate) fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    pub(crate) fn history_config(&self) -> &HistoryPolicyConfig {
        &self.history_cfg
    }
}
