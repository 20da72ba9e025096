//! 报文类型：在边界处一次性转成静态类型，内层代码不再碰动态 JSON。

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use domain::{GpsFix, RegisterSample};
use serde::Deserialize;

/// telemetry 主题的载荷：顶层 `GPS` 对象。
#[derive(Debug, Deserialize)]
pub struct TelemetryPayload {
    #[serde(rename = "GPS")]
    pub gps: Option<GpsBlock>,
}

/// GPS 块。
#[derive(Debug, Deserialize)]
pub struct GpsBlock {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub satellites: Option<i64>,
    #[serde(default)]
    pub fix_status: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub date_iso_8601: Option<String>,
}

impl GpsBlock {
    /// 报文内时间：date_iso_8601 优先，epoch 秒兜底，都解析失败为 None。
    pub fn gps_time(&self) -> Option<DateTime<Utc>> {
        if let Some(iso) = self.date_iso_8601.as_deref() {
            if let Some(parsed) = parse_iso8601(iso) {
                return Some(parsed);
            }
        }
        let epoch = self.timestamp?;
        Utc.timestamp_opt(epoch, 0).single()
    }

    pub fn to_fix(&self, received_at: DateTime<Utc>) -> GpsFix {
        GpsFix {
            lat: self.latitude,
            lon: self.longitude,
            satellites: self.satellites.and_then(|sats| i32::try_from(sats).ok()),
            fix_status: self.fix_status.and_then(|status| i32::try_from(status).ok()),
            gps_time: self.gps_time(),
            received_at,
        }
    }
}

/// decoded 主题的载荷。
#[derive(Debug, Deserialize)]
pub struct DecodedPayload {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub router_sn: Option<String>,
    #[serde(default)]
    pub bserver_id: Option<i64>,
    #[serde(default)]
    pub registers: Option<Vec<RegisterPayload>>,
}

impl DecodedPayload {
    pub fn sample_time(&self) -> Option<DateTime<Utc>> {
        parse_iso8601(self.timestamp.as_deref()?)
    }
}

/// 单个寄存器条目。value 字段在线上偶见非数值，保留原始 JSON 值，
/// 转换时退回 text。
#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    #[serde(default)]
    pub addr: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub raw: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RegisterPayload {
    /// 转为域样本；addr 缺失或越界返回 None（调用方告警后跳过）。
    pub fn to_sample(&self, ts: Option<DateTime<Utc>>) -> Option<(i32, RegisterSample)> {
        let addr = i32::try_from(self.addr?).ok()?;

        let mut text = self.text.clone();
        let value = match &self.value {
            Some(serde_json::Value::Number(number)) => number.as_f64(),
            Some(serde_json::Value::String(raw_text)) => {
                // 非数值 value 当作文本保存
                if text.is_none() {
                    text = Some(raw_text.clone());
                }
                None
            }
            _ => None,
        };

        Some((
            addr,
            RegisterSample {
                ts,
                value,
                raw: self.raw,
                text,
                unit: self.unit.clone(),
                name: self.name.clone(),
                reason: self.reason.clone(),
            },
        ))
    }
}

/// 宽松的 ISO-8601 解析：先 RFC3339（带时区），再无时区的裸格式按 UTC。
pub fn parse_iso8601(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    None
}
