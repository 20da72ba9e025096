//! 规约场景的端到端回放（内存存储 + 受控时钟）。

mod common;

use common::{Harness, analog_entry};
use domain::{EventType, RejectReason, StateKey, WriteReason};
use serde_json::json;

const HOME: (f64, f64) = (59.851624, 30.479838);
const FAR: (f64, f64) = (55.751244, 37.618423);

/// S1：正常点被接受，一分钟后的瞬移点被拒并产生事件。
#[tokio::test]
async fn s1_accept_then_teleport_reject() {
    let h = Harness::new().await;

    h.handle(h.gps_message("SN-1", HOME.0, HOME.1, 8, 1)).await;
    h.clock.advance_sec(60);
    h.handle(h.gps_message("SN-1", FAR.0, FAR.1, 10, 1)).await;

    let rows = h.gps.raw_rows();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].accepted);
    assert!(!rows[1].accepted);
    assert_eq!(rows[1].reject_reason, Some(RejectReason::JumpDistance));

    // latest 仍是首个接受点
    let latest = h.gps.latest_of("SN-1").expect("latest");
    assert_eq!(latest.lat, HOME.0);
    assert_eq!(latest.lon, HOME.1);

    assert_eq!(h.events.count_of(EventType::GpsJumpRejected), 1);
}

/// S2：瞬移之后的邻近点簇确认真实移动。
#[tokio::test]
async fn s2_confirm_after_jump() {
    let h = Harness::new().await;

    h.handle(h.gps_message("SN-1", HOME.0, HOME.1, 8, 1)).await;
    h.clock.advance_sec(60);
    h.handle(h.gps_message("SN-1", FAR.0, FAR.1, 10, 1)).await;

    // 三个 50 米内的确认点，第三个放行
    let confirmers = [
        (FAR.0 + 0.0001, FAR.1),
        (FAR.0 + 0.0002, FAR.1),
        (FAR.0 + 0.0001, FAR.1 + 0.0001),
    ];
    for (lat, lon) in confirmers {
        h.clock.advance_sec(60);
        h.handle(h.gps_message("SN-1", lat, lon, 9, 1)).await;
    }

    let rows = h.gps.raw_rows();
    assert_eq!(rows.len(), 5);
    let accepted: Vec<bool> = rows.iter().map(|row| row.accepted).collect();
    assert_eq!(accepted, vec![true, false, false, false, true]);

    let latest = h.gps.latest_of("SN-1").expect("latest");
    assert_eq!(latest.lat, FAR.0 + 0.0001);
    assert_eq!(latest.lon, FAR.1 + 0.0001);
}

/// S3：死区 + 最小间隔 + 心跳的抑制序列。
#[tokio::test]
async fn s3_history_suppression_sequence() {
    let h = Harness::new().await;
    h.put_catalog(40034, analog_entry(0.5, 10, 60));
    h.reload_catalog().await;

    let send = |value: f64| {
        h.decoded_message("SN-1", 1, json!([{ "addr": 40034, "value": value }]))
    };

    h.handle(send(150.0)).await;
    h.clock.advance_sec(5);
    h.handle(send(150.2)).await;
    h.clock.advance_sec(15);
    h.handle(send(151.0)).await;
    h.clock.advance_sec(70);
    h.handle(send(151.0)).await;

    let key = StateKey::new("SN-1", "pcc", 1, 40034);
    let rows = h.history.rows_for(&key);
    let summary: Vec<(WriteReason, Option<f64>)> = rows
        .iter()
        .map(|row| (row.write_reason, row.sample.value))
        .collect();
    assert_eq!(
        summary,
        vec![
            (WriteReason::First, Some(150.0)),
            (WriteReason::Change, Some(151.0)),
            (WriteReason::Heartbeat, Some(151.0)),
        ]
    );

    // latest_state 总是跟随最后一条观测
    assert_eq!(h.state.get(&key).expect("state").value, Some(151.0));
}

/// S4：目录外寄存器只进 latest_state，事件只发一次。
#[tokio::test]
async fn s4_unknown_register() {
    let h = Harness::new().await;

    let send = |value: f64| {
        h.decoded_message("SN-1", 1, json!([{ "addr": 49999, "value": value }]))
    };

    h.handle(send(1.0)).await;
    h.clock.advance_sec(30);
    h.handle(send(2.0)).await;

    let key = StateKey::new("SN-1", "pcc", 1, 49999);
    assert_eq!(h.state.get(&key).expect("state").value, Some(2.0));
    assert!(h.history.rows_for(&key).is_empty());
    assert_eq!(h.events.count_of(EventType::UnknownRegister), 1);
}

/// 重放同一条 decoded 消息不改变落库结果（幂等）。
#[tokio::test]
async fn replaying_a_message_is_idempotent() {
    let h = Harness::new().await;
    h.put_catalog(40034, analog_entry(0.5, 10, 600));
    h.reload_catalog().await;

    let message = h.decoded_message("SN-1", 1, json!([{ "addr": 40034, "value": 150.0 }]));
    h.handle(message.clone()).await;
    h.handle(message).await;

    let key = StateKey::new("SN-1", "pcc", 1, 40034);
    let rows = h.history.rows_for(&key);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].write_reason, WriteReason::First);
    assert_eq!(h.state.get(&key).expect("state").value, Some(150.0));
}

/// 每条入站 GPS 定位恰好产生一行 raw，接受与否各自计入。
#[tokio::test]
async fn every_fix_lands_in_raw_history_exactly_once() {
    let h = Harness::new().await;

    h.handle(h.gps_message("SN-1", HOME.0, HOME.1, 8, 1)).await;
    // 质量门拒绝
    h.clock.advance_sec(10);
    h.handle(h.gps_message("SN-1", HOME.0, HOME.1, 2, 1)).await;
    h.clock.advance_sec(10);
    h.handle(h.gps_message("SN-1", HOME.0, HOME.1, 8, 0)).await;

    let rows = h.gps.raw_rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].reject_reason, Some(RejectReason::LowSats));
    assert_eq!(rows[2].reject_reason, Some(RejectReason::BadFix));

    // 质量事件每对象每分钟至多一条
    assert_eq!(h.events.count_of(EventType::GpsLowSats), 1);
    assert_eq!(h.events.count_of(EventType::GpsBadFix), 1);

    h.clock.advance_sec(10);
    h.handle(h.gps_message("SN-1", HOME.0, HOME.1, 2, 1)).await;
    assert_eq!(h.events.count_of(EventType::GpsLowSats), 1);

    h.clock.advance_sec(61);
    h.handle(h.gps_message("SN-1", HOME.0, HOME.1, 2, 1)).await;
    assert_eq!(h.events.count_of(EventType::GpsLowSats), 2);
}

/// reason 迁移立即写 reason_change，不受最小间隔约束。
#[tokio::test]
async fn reason_transition_is_written_immediately() {
    let h = Harness::new().await;
    h.put_catalog(40040, analog_entry(0.5, 30, 600));
    h.reload_catalog().await;

    h.handle(h.decoded_message("SN-1", 1, json!([{ "addr": 40040, "value": 10.0 }])))
        .await;
    h.clock.advance_sec(2);
    h.handle(h.decoded_message(
        "SN-1",
        1,
        json!([{ "addr": 40040, "value": null, "reason": "N/A" }]),
    ))
    .await;

    let key = StateKey::new("SN-1", "pcc", 1, 40040);
    let rows = h.history.rows_for(&key);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].write_reason, WriteReason::ReasonChange);
    assert_eq!(rows[1].sample.reason.as_deref(), Some("N/A"));
}

/// 报文缺名称/单位时由目录默认值补齐。
#[tokio::test]
async fn catalog_defaults_fill_name_and_unit() {
    let h = Harness::new().await;
    let mut entry = analog_entry(0.5, 10, 600);
    entry.name_default = Some("P_sum".to_string());
    entry.unit_default = Some("kW".to_string());
    h.put_catalog(40034, entry);
    h.reload_catalog().await;

    h.handle(h.decoded_message("SN-1", 1, json!([{ "addr": 40034, "value": 1.0 }])))
        .await;

    let key = StateKey::new("SN-1", "pcc", 1, 40034);
    let stored = h.state.get(&key).expect("state");
    assert_eq!(stored.name.as_deref(), Some("P_sum"));
    assert_eq!(stored.unit.as_deref(), Some("kW"));
}

/// 坏 JSON 与不匹配主题被静默丢弃，不产生任何行。
#[tokio::test]
async fn malformed_input_is_dropped() {
    let h = Harness::new().await;

    let mut message = h.gps_message("SN-1", HOME.0, HOME.1, 8, 1);
    message.payload = b"{not json".to_vec();
    h.handle(message).await;

    let mut message = h.gps_message("SN-1", HOME.0, HOME.1, 8, 1);
    message.topic = "cg/v1/other/SN/SN-1".to_string();
    h.handle(message).await;

    assert!(h.gps.raw_rows().is_empty());
    assert!(h.events.events().is_empty());
    // 载荷没解析出来就不会有任何落库
    assert_eq!(h.objects.object_count(), 0);
}
