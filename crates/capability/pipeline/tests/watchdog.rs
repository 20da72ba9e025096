//! watchdog 的 offline/online/stale 行为（S5 及失联寄存器）。

mod common;

use cg_pipeline::EventsPolicyConfig;
use cg_gps::GpsFilterConfig;
use cg_history::HistoryPolicyConfig;
use common::{Harness, analog_entry};
use domain::EventType;
use serde_json::json;

/// S5：停发 301 秒 → 一条 router_offline；恢复发布 → 一条 router_online。
#[tokio::test]
async fn s5_offline_then_online() {
    let h = Harness::new().await; // router_offline_sec = 300

    h.handle(h.gps_message("SN-1", 59.85, 30.48, 8, 1)).await;

    h.clock.advance_sec(301);
    h.pipeline.watchdog_tick().await.expect("tick");
    assert_eq!(h.events.count_of(EventType::RouterOffline), 1);

    // 反复扫描不会重复发事件
    h.pipeline.watchdog_tick().await.expect("tick");
    h.pipeline.watchdog_tick().await.expect("tick");
    assert_eq!(h.events.count_of(EventType::RouterOffline), 1);

    // 恢复发布：到达路径触发 online 迁移
    h.clock.advance_sec(10);
    h.handle(h.gps_message("SN-1", 59.85, 30.48, 8, 1)).await;
    assert_eq!(h.events.count_of(EventType::RouterOnline), 1);

    // 再次扫描无新事件
    h.pipeline.watchdog_tick().await.expect("tick");
    assert_eq!(h.events.count_of(EventType::RouterOffline), 1);
    assert_eq!(h.events.count_of(EventType::RouterOnline), 1);
}

/// 面板级实体独立计时：decoded 消息同时维护对象级与面板级状态。
#[tokio::test]
async fn panel_entities_tracked_separately() {
    let h = Harness::new().await;

    h.handle(h.decoded_message("SN-1", 2, json!([]))).await;

    h.clock.advance_sec(301);
    h.pipeline.watchdog_tick().await.expect("tick");
    // 对象级 + 面板级各一条 offline
    assert_eq!(h.events.count_of(EventType::RouterOffline), 2);
    let panel_event = h
        .events
        .events()
        .into_iter()
        .find(|event| event.panel_id.is_some())
        .expect("panel event");
    assert_eq!(panel_event.equip_type.as_deref(), Some("pcc"));
    assert_eq!(panel_event.panel_id, Some(2));
}

/// 带心跳的寄存器失联一次只报一条，来样本后复位。
#[tokio::test]
async fn stale_register_reported_once_per_gap() {
    let events_cfg = EventsPolicyConfig {
        stale_register_sec: 600,
        ..EventsPolicyConfig::default()
    };
    let h = Harness::with(
        GpsFilterConfig::default(),
        HistoryPolicyConfig::default(),
        events_cfg,
    )
    .await;
    // addr 40034 有心跳（可报失联），addr 40090 心跳为零（不报）
    h.put_catalog(40034, analog_entry(0.5, 10, 60));
    h.put_catalog(40090, analog_entry(0.5, 10, 0));
    h.reload_catalog().await;

    h.handle(h.decoded_message(
        "SN-1",
        1,
        json!([
            { "addr": 40034, "value": 1.0 },
            { "addr": 40090, "value": 2.0 }
        ]),
    ))
    .await;

    h.clock.advance_sec(601);
    h.pipeline.watchdog_tick().await.expect("tick");
    assert_eq!(h.events.count_of(EventType::StaleRegister), 1);

    // 同一失联期内不再重复
    h.clock.advance_sec(60);
    h.pipeline.watchdog_tick().await.expect("tick");
    assert_eq!(h.events.count_of(EventType::StaleRegister), 1);

    // 新样本复位标记，下一个失联期再报
    h.handle(h.decoded_message("SN-1", 1, json!([{ "addr": 40034, "value": 3.0 }])))
        .await;
    h.clock.advance_sec(601);
    h.pipeline.watchdog_tick().await.expect("tick");
    assert_eq!(h.events.count_of(EventType::StaleRegister), 2);
}
