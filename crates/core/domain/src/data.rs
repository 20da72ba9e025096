use chrono::{DateTime, Utc};

/// 单条 GPS 定位观测（已从报文解析）。
#[derive(Debug, Clone, PartialEq)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    pub satellites: Option<i32>,
    pub fix_status: Option<i32>,
    pub gps_time: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

/// GPS 点被过滤器拒绝的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    LowSats,
    BadFix,
    JumpDistance,
    JumpSpeed,
}

impl RejectReason {
    /// 落库用的稳定字符串。
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::LowSats => "low_sats",
            RejectReason::BadFix => "bad_fix",
            RejectReason::JumpDistance => "jump_distance",
            RejectReason::JumpSpeed => "jump_speed",
        }
    }
}

/// history 行的写入原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteReason {
    First,
    Change,
    Heartbeat,
    ReasonChange,
}

impl WriteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteReason::First => "first",
            WriteReason::Change => "change",
            WriteReason::Heartbeat => "heartbeat",
            WriteReason::ReasonChange => "reason_change",
        }
    }
}

/// 寄存器值类别，决定死区比较的方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Analog,
    Discrete,
    Counter,
    Enum,
    Text,
}

impl ValueKind {
    /// 数值类别使用 tolerance 死区；enum/text 按 raw/text 精确比较。
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueKind::Analog | ValueKind::Discrete | ValueKind::Counter
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Analog => "analog",
            ValueKind::Discrete => "discrete",
            ValueKind::Counter => "counter",
            ValueKind::Enum => "enum",
            ValueKind::Text => "text",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "analog" => Some(ValueKind::Analog),
            "discrete" => Some(ValueKind::Discrete),
            "counter" => Some(ValueKind::Counter),
            "enum" => Some(ValueKind::Enum),
            "text" => Some(ValueKind::Text),
            _ => None,
        }
    }
}

/// register_catalog 键：设备类型 + 寄存器地址。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogKey {
    pub equip_type: String,
    pub addr: i32,
}

/// register_catalog 条目：单寄存器的落库策略。
///
/// tolerance / min_interval_sec / heartbeat_sec 为 None 时由配置默认值兜底。
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name_default: Option<String>,
    pub unit_default: Option<String>,
    pub value_kind: ValueKind,
    pub tolerance: Option<f64>,
    pub min_interval_sec: Option<i64>,
    pub heartbeat_sec: Option<i64>,
    pub store_history: bool,
}

/// latest_state / history 的行键。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub router_sn: String,
    pub equip_type: String,
    pub panel_id: i32,
    pub addr: i32,
}

impl StateKey {
    pub fn new(router_sn: impl Into<String>, equip_type: impl Into<String>, panel_id: i32, addr: i32) -> Self {
        Self {
            router_sn: router_sn.into(),
            equip_type: equip_type.into(),
            panel_id,
            addr,
        }
    }
}

/// 单条寄存器观测（已从报文解析）。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterSample {
    pub ts: Option<DateTime<Utc>>,
    pub value: Option<f64>,
    pub raw: Option<i64>,
    pub text: Option<String>,
    pub unit: Option<String>,
    pub name: Option<String>,
    pub reason: Option<String>,
}

/// 派生事件类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    RouterOffline,
    RouterOnline,
    GpsJumpRejected,
    GpsLowSats,
    GpsBadFix,
    UnknownRegister,
    StaleRegister,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RouterOffline => "router_offline",
            EventType::RouterOnline => "router_online",
            EventType::GpsJumpRejected => "gps_jump_rejected",
            EventType::GpsLowSats => "gps_low_sats",
            EventType::GpsBadFix => "gps_bad_fix",
            EventType::UnknownRegister => "unknown_register",
            EventType::StaleRegister => "stale_register",
        }
    }
}

/// 追加写入 events 表的事件记录；created_at 由存储层填充。
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub router_sn: String,
    pub equip_type: Option<String>,
    pub panel_id: Option<i32>,
    pub event_type: EventType,
    pub description: String,
    pub payload: Option<serde_json::Value>,
}

impl EventRecord {
    /// 对象级事件（无设备维度）。
    pub fn for_router(
        router_sn: impl Into<String>,
        event_type: EventType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            router_sn: router_sn.into(),
            equip_type: None,
            panel_id: None,
            event_type,
            description: description.into(),
            payload: None,
        }
    }

    /// 面板级事件。
    pub fn for_panel(
        router_sn: impl Into<String>,
        equip_type: impl Into<String>,
        panel_id: i32,
        event_type: EventType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            router_sn: router_sn.into(),
            equip_type: Some(equip_type.into()),
            panel_id: Some(panel_id),
            event_type,
            description: description.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
