//! 集成测试公共脚手架：内存存储 + 受控时钟 + 报文构造。

#![allow(dead_code)]

use cg_gps::GpsFilterConfig;
use cg_history::HistoryPolicyConfig;
use cg_ingest::{InboundMessage, IngestConfig};
use cg_pipeline::{EventsPolicyConfig, IngestPipeline, PipelineStores};
use cg_storage::{
    CatalogCache, InMemoryCatalogStore, InMemoryEventStore, InMemoryGpsStore,
    InMemoryHistoryStore, InMemoryObjectStore, InMemoryStateStore,
};
use chrono::{DateTime, TimeZone, Utc};
use domain::{CatalogEntry, Clock, ValueKind};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// 测试用受控时钟。
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance_sec(&self, sec: i64) {
        let mut now = self.now.lock().expect("clock lock");
        *now += chrono::Duration::seconds(sec);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// 目录条目简写。
pub fn analog_entry(tolerance: f64, min_interval_sec: i64, heartbeat_sec: i64) -> CatalogEntry {
    CatalogEntry {
        name_default: None,
        unit_default: None,
        value_kind: ValueKind::Analog,
        tolerance: Some(tolerance),
        min_interval_sec: Some(min_interval_sec),
        heartbeat_sec: Some(heartbeat_sec),
        store_history: true,
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub objects: Arc<InMemoryObjectStore>,
    pub gps: Arc<InMemoryGpsStore>,
    pub state: Arc<InMemoryStateStore>,
    pub history: Arc<InMemoryHistoryStore>,
    pub events: Arc<InMemoryEventStore>,
    pub catalog_store: Arc<InMemoryCatalogStore>,
    pub catalog: Arc<CatalogCache>,
    pub pipeline: IngestPipeline,
    gps_cfg: GpsFilterConfig,
    history_cfg: HistoryPolicyConfig,
    events_cfg: EventsPolicyConfig,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(
            GpsFilterConfig::default(),
            HistoryPolicyConfig::default(),
            EventsPolicyConfig::default(),
        )
        .await
    }

    pub async fn with(
        gps_cfg: GpsFilterConfig,
        history_cfg: HistoryPolicyConfig,
        events_cfg: EventsPolicyConfig,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let objects = Arc::new(InMemoryObjectStore::new());
        let gps = Arc::new(InMemoryGpsStore::new());
        let state = Arc::new(InMemoryStateStore::new());
        let history = Arc::new(InMemoryHistoryStore::new());
        let events = Arc::new(InMemoryEventStore::new());
        let catalog_store = Arc::new(InMemoryCatalogStore::new());
        let catalog = Arc::new(CatalogCache::new());
        catalog
            .load(catalog_store.as_ref())
            .await
            .expect("catalog load");

        let pipeline = build_pipeline(
            &objects, &gps, &state, &history, &events, &catalog, &clock,
            gps_cfg.clone(), history_cfg.clone(), events_cfg.clone(),
        );

        Self {
            clock,
            objects,
            gps,
            state,
            history,
            events,
            catalog_store,
            catalog,
            pipeline,
            gps_cfg,
            history_cfg,
            events_cfg,
        }
    }

    /// 在同一批存储上重建管线（模拟进程重启）。
    pub async fn respawn(&self) -> IngestPipeline {
        let catalog = Arc::new(CatalogCache::new());
        catalog
            .load(self.catalog_store.as_ref())
            .await
            .expect("catalog load");
        build_pipeline(
            &self.objects,
            &self.gps,
            &self.state,
            &self.history,
            &self.events,
            &catalog,
            &self.clock,
            self.gps_cfg.clone(),
            self.history_cfg.clone(),
            self.events_cfg.clone(),
        )
    }

    pub fn put_catalog(&self, addr: i32, entry: CatalogEntry) {
        self.catalog_store.put("pcc", addr, entry);
    }

    pub async fn reload_catalog(&self) {
        self.catalog
            .load(self.catalog_store.as_ref())
            .await
            .expect("catalog reload");
    }

    pub fn gps_message(
        &self,
        router_sn: &str,
        lat: f64,
        lon: f64,
        satellites: i64,
        fix_status: i64,
    ) -> InboundMessage {
        let payload = json!({
            "GPS": {
                "latitude": lat,
                "longitude": lon,
                "satellites": satellites,
                "fix_status": fix_status,
                "timestamp": self.clock.now().timestamp(),
            }
        });
        InboundMessage {
            topic: format!("cg/v1/telemetry/SN/{router_sn}"),
            payload: serde_json::to_vec(&payload).expect("payload"),
            received_at: self.clock.now(),
        }
    }

    pub fn decoded_message(
        &self,
        router_sn: &str,
        panel_id: i32,
        registers: serde_json::Value,
    ) -> InboundMessage {
        let payload = json!({
            "timestamp": self.clock.now().to_rfc3339(),
            "router_sn": router_sn,
            "bserver_id": 1,
            "registers": registers,
        });
        InboundMessage {
            topic: format!("cg/v1/decoded/SN/{router_sn}/pcc/{panel_id}"),
            payload: serde_json::to_vec(&payload).expect("payload"),
            received_at: self.clock.now(),
        }
    }

    pub async fn handle(&self, message: InboundMessage) {
        self.pipeline.handle(message).await.expect("handle");
    }
}

#[allow(clippy::too_many_arguments)]
fn build_pipeline(
    objects: &Arc<InMemoryObjectStore>,
    gps: &Arc<InMemoryGpsStore>,
    state: &Arc<InMemoryStateStore>,
    history: &Arc<InMemoryHistoryStore>,
    events: &Arc<InMemoryEventStore>,
    catalog: &Arc<CatalogCache>,
    clock: &Arc<ManualClock>,
    gps_cfg: GpsFilterConfig,
    history_cfg: HistoryPolicyConfig,
    events_cfg: EventsPolicyConfig,
) -> IngestPipeline {
    IngestPipeline::new(
        PipelineStores {
            objects: objects.clone(),
            gps: gps.clone(),
            state: state.clone(),
            history: history.clone(),
            events: events.clone(),
        },
        catalog.clone(),
        clock.clone(),
        gps_cfg,
        history_cfg,
        events_cfg,
        &IngestConfig::default(),
    )
}
