//! history 落库决策。
//!
//! 对每条寄存器观测回答一个问题：要不要追加一行 history，原因是什么。
//! 决策为纯内存计算；latest_state 的覆盖写不在本 crate 的职责内，
//! 调用方对每条观测无条件执行。
//!
//! 规则按优先级排列：
//! 1. 目录缺失或 store_history=false：不写
//! 2. 该键从未写过：`first`
//! 3. reason 字符串发生迁移：`reason_change`
//! 4. 值变化超出死区且距上次写入满 min_interval：`change`
//! 5. 距上次写入满 heartbeat：`heartbeat`
//! 6. 其余情况抑制

use chrono::{DateTime, Utc};
use domain::{CatalogEntry, RegisterSample, ValueKind, WriteReason};
use serde::Deserialize;

/// KPI 寄存器覆盖项：比目录更短的 heartbeat / 更紧的死区。
#[derive(Debug, Clone, Deserialize)]
pub struct KpiRegister {
    pub addr: i32,
    #[serde(default = "default_kpi_heartbeat")]
    pub heartbeat_sec: i64,
    #[serde(default = "default_kpi_tolerance")]
    pub tolerance: f64,
}

fn default_kpi_heartbeat() -> i64 {
    60
}

fn default_kpi_tolerance() -> f64 {
    0.1
}

/// 落库策略参数。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryPolicyConfig {
    pub default_tolerance: f64,
    pub default_min_interval_sec: i64,
    pub default_heartbeat_sec: i64,
    pub kpi_registers: Vec<KpiRegister>,
}

impl Default for HistoryPolicyConfig {
    fn default() -> Self {
        Self {
            default_tolerance: 0.5,
            default_min_interval_sec: 10,
            default_heartbeat_sec: 900,
            kpi_registers: Vec::new(),
        }
    }
}

impl HistoryPolicyConfig {
    pub fn kpi_for(&self, addr: i32) -> Option<&KpiRegister> {
        self.kpi_registers.iter().find(|kpi| kpi.addr == addr)
    }
}

/// 某地址解析后的有效参数。
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveParams {
    pub tolerance: Option<f64>,
    pub min_interval_sec: i64,
    pub heartbeat_sec: i64,
    pub store_history: bool,
    pub value_kind: ValueKind,
}

/// 参数解析：配置默认值 ← 目录条目非空字段 ← KPI 覆盖。
///
/// 目录缺失返回 None：未知寄存器只进 latest_state，不写 history，
/// KPI 覆盖同样不生效。
pub fn resolve_params(
    cfg: &HistoryPolicyConfig,
    addr: i32,
    entry: Option<&CatalogEntry>,
) -> Option<EffectiveParams> {
    let entry = entry?;
    let value_kind = entry.value_kind;

    let mut tolerance = match value_kind {
        ValueKind::Analog => Some(entry.tolerance.unwrap_or(cfg.default_tolerance)),
        // 离散/计数类任何变化都有意义
        ValueKind::Discrete | ValueKind::Counter => Some(entry.tolerance.unwrap_or(0.0)),
        ValueKind::Enum | ValueKind::Text => None,
    };
    let min_interval_sec = entry
        .min_interval_sec
        .unwrap_or(cfg.default_min_interval_sec);
    let mut heartbeat_sec = entry.heartbeat_sec.unwrap_or(cfg.default_heartbeat_sec);

    if let Some(kpi) = cfg.kpi_for(addr) {
        heartbeat_sec = kpi.heartbeat_sec;
        if value_kind.is_numeric() {
            tolerance = Some(kpi.tolerance);
        }
    }

    Some(EffectiveParams {
        tolerance,
        min_interval_sec,
        heartbeat_sec,
        store_history: entry.store_history,
        value_kind,
    })
}

/// 每个行键的内存状态。
///
/// `last_*` 镜像最近一次写入 history 的样本；`last_sample_ts` 与
/// `stale_reported` 供 watchdog 判断寄存器失联。
#[derive(Debug, Clone, Default)]
pub struct KeyState {
    pub last_value: Option<f64>,
    pub last_raw: Option<i64>,
    pub last_text: Option<String>,
    pub last_reason: Option<String>,
    pub last_stored_ts: Option<DateTime<Utc>>,
    pub last_heartbeat_ts: Option<DateTime<Utc>>,
    pub last_sample_ts: Option<DateTime<Utc>>,
    pub stale_reported: bool,
}

impl KeyState {
    /// 每条观测（无论是否落库）都要调用。
    pub fn note_sample(&mut self, now: DateTime<Utc>) {
        self.last_sample_ts = Some(now);
        self.stale_reported = false;
    }

    /// history 写入成功后刷新存量镜像；任何写入都顺带推进心跳锚点。
    pub fn note_write(&mut self, sample: &RegisterSample, now: DateTime<Utc>) {
        self.last_value = sample.value;
        self.last_raw = sample.raw;
        self.last_text = sample.text.clone();
        self.last_reason = sample.reason.clone();
        self.last_stored_ts = Some(now);
        self.last_heartbeat_ts = Some(now);
    }
}

/// 判定一条观测是否写 history。调用方需先用 [`resolve_params`]
/// 排除目录缺失的情况。
pub fn decide(
    params: &EffectiveParams,
    state: &KeyState,
    sample: &RegisterSample,
    now: DateTime<Utc>,
) -> Option<WriteReason> {
    if !params.store_history {
        return None;
    }

    let Some(last_stored_ts) = state.last_stored_ts else {
        return Some(WriteReason::First);
    };

    if sample.reason.as_deref() != state.last_reason.as_deref() {
        return Some(WriteReason::ReasonChange);
    }

    let elapsed_sec = (now - last_stored_ts).num_seconds();
    if elapsed_sec >= params.min_interval_sec && value_changed(params, state, sample) {
        return Some(WriteReason::Change);
    }

    if params.heartbeat_sec > 0 {
        let anchor = state.last_heartbeat_ts.unwrap_or(last_stored_ts);
        if (now - anchor).num_seconds() >= params.heartbeat_sec {
            return Some(WriteReason::Heartbeat);
        }
    }

    None
}

/// 变化检测。数值类别比较 value 死区；value 双方为空或类别为
/// enum/text 时退回到 raw/text 的精确比较。
fn value_changed(params: &EffectiveParams, state: &KeyState, sample: &RegisterSample) -> bool {
    if let Some(tolerance) = params.tolerance {
        match (sample.value, state.last_value) {
            (Some(new), Some(prev)) => return (new - prev).abs() > tolerance,
            (Some(_), None) | (None, Some(_)) => return true,
            (None, None) => {}
        }
    }
    sample.raw != state.last_raw || sample.text.as_deref() != state.last_text.as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(kind: ValueKind) -> CatalogEntry {
        CatalogEntry {
            name_default: None,
            unit_default: None,
            value_kind: kind,
            tolerance: None,
            min_interval_sec: None,
            heartbeat_sec: None,
            store_history: true,
        }
    }

    fn at(sec: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + sec, 0).unwrap()
    }

    fn sample(value: Option<f64>) -> RegisterSample {
        RegisterSample {
            value,
            ..RegisterSample::default()
        }
    }

    fn params(tolerance: f64, min_interval: i64, heartbeat: i64) -> EffectiveParams {
        EffectiveParams {
            tolerance: Some(tolerance),
            min_interval_sec: min_interval,
            heartbeat_sec: heartbeat,
            store_history: true,
            value_kind: ValueKind::Analog,
        }
    }

    #[test]
    fn resolve_prefers_catalog_then_kpi() {
        let cfg = HistoryPolicyConfig {
            kpi_registers: vec![KpiRegister {
                addr: 40100,
                heartbeat_sec: 30,
                tolerance: 0.05,
            }],
            ..HistoryPolicyConfig::default()
        };

        let mut catalog = entry(ValueKind::Analog);
        catalog.tolerance = Some(2.0);
        catalog.heartbeat_sec = Some(600);

        // 仅目录覆盖
        let p = resolve_params(&cfg, 40034, Some(&catalog)).expect("params");
        assert_eq!(p.tolerance, Some(2.0));
        assert_eq!(p.heartbeat_sec, 600);
        assert_eq!(p.min_interval_sec, 10);

        // KPI 覆盖在目录之上
        let p = resolve_params(&cfg, 40100, Some(&catalog)).expect("params");
        assert_eq!(p.tolerance, Some(0.05));
        assert_eq!(p.heartbeat_sec, 30);

        // 目录缺失：未知寄存器，KPI 不救场
        assert!(resolve_params(&cfg, 40100, None).is_none());
    }

    #[test]
    fn resolve_drops_tolerance_for_text_kinds() {
        let cfg = HistoryPolicyConfig::default();
        let p = resolve_params(&cfg, 1, Some(&entry(ValueKind::Text))).expect("params");
        assert_eq!(p.tolerance, None);
        let p = resolve_params(&cfg, 1, Some(&entry(ValueKind::Discrete))).expect("params");
        assert_eq!(p.tolerance, Some(0.0));
    }

    #[test]
    fn suppression_sequence_first_change_heartbeat() {
        // tolerance=0.5, min_interval=10s, heartbeat=60s
        let p = params(0.5, 10, 60);
        let mut state = KeyState::default();

        let s = sample(Some(150.0));
        assert_eq!(decide(&p, &state, &s, at(0)), Some(WriteReason::First));
        state.note_write(&s, at(0));

        // 死区内且间隔不足：抑制
        let s = sample(Some(150.2));
        assert_eq!(decide(&p, &state, &s, at(5)), None);

        let s = sample(Some(151.0));
        assert_eq!(decide(&p, &state, &s, at(20)), Some(WriteReason::Change));
        state.note_write(&s, at(20));

        // 值不变，心跳到期
        let s = sample(Some(151.0));
        assert_eq!(decide(&p, &state, &s, at(90)), Some(WriteReason::Heartbeat));
    }

    #[test]
    fn min_interval_gates_change_but_not_heartbeat() {
        let p = params(0.5, 30, 60);
        let mut state = KeyState::default();
        let s = sample(Some(10.0));
        state.note_write(&s, at(0));

        // 超死区但间隔不足
        let s = sample(Some(20.0));
        assert_eq!(decide(&p, &state, &s, at(10)), None);
        assert_eq!(decide(&p, &state, &s, at(30)), Some(WriteReason::Change));
    }

    #[test]
    fn reason_transition_writes_immediately() {
        let p = params(0.5, 10, 600);
        let mut state = KeyState::default();
        let s = sample(Some(1.0));
        state.note_write(&s, at(0));

        // value 变 null + reason 出现：reason_change 不受 min_interval 约束
        let mut s = sample(None);
        s.reason = Some("N/A".to_string());
        assert_eq!(decide(&p, &state, &s, at(1)), Some(WriteReason::ReasonChange));
        state.note_write(&s, at(1));

        // reason 消失同样算迁移
        let s = sample(Some(1.0));
        assert_eq!(decide(&p, &state, &s, at(2)), Some(WriteReason::ReasonChange));
    }

    #[test]
    fn raw_only_delta_counts_as_change_when_value_null() {
        let p = EffectiveParams {
            tolerance: Some(0.5),
            min_interval_sec: 0,
            heartbeat_sec: 0,
            store_history: true,
            value_kind: ValueKind::Analog,
        };
        let mut state = KeyState::default();
        let mut s = sample(None);
        s.raw = Some(7);
        state.note_write(&s, at(0));

        let mut s = sample(None);
        s.raw = Some(8);
        assert_eq!(decide(&p, &state, &s, at(5)), Some(WriteReason::Change));
    }

    #[test]
    fn text_kind_compares_exactly() {
        let p = EffectiveParams {
            tolerance: None,
            min_interval_sec: 0,
            heartbeat_sec: 0,
            store_history: true,
            value_kind: ValueKind::Text,
        };
        let mut state = KeyState::default();
        let mut s = sample(None);
        s.text = Some("RUN".to_string());
        state.note_write(&s, at(0));

        let mut s = sample(None);
        s.text = Some("RUN".to_string());
        assert_eq!(decide(&p, &state, &s, at(5)), None);
        s.text = Some("STOP".to_string());
        assert_eq!(decide(&p, &state, &s, at(6)), Some(WriteReason::Change));
    }

    #[test]
    fn store_history_false_suppresses_everything() {
        let mut p = params(0.5, 0, 0);
        p.store_history = false;
        let state = KeyState::default();
        assert_eq!(decide(&p, &state, &sample(Some(1.0)), at(0)), None);
    }

    #[test]
    fn heartbeat_disabled_when_zero() {
        let p = params(0.5, 10, 0);
        let mut state = KeyState::default();
        let s = sample(Some(1.0));
        state.note_write(&s, at(0));
        assert_eq!(decide(&p, &state, &s, at(100_000)), None);
    }

    #[test]
    fn note_sample_clears_stale_flag() {
        let mut state = KeyState {
            stale_reported: true,
            ..KeyState::default()
        };
        state.note_sample(at(0));
        assert!(!state.stale_reported);
        assert_eq!(state.last_sample_ts, Some(at(0)));
    }
}
