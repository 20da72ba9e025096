//! 主题文法解析。
//!
//! 两类订阅：
//! - `cg/v1/telemetry/SN/<router_sn>`：GPS 报文
//! - `cg/v1/decoded/SN/<router_sn>/pcc/<panel_id>`：面板寄存器报文

/// 解析后的主题。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Telemetry {
        router_sn: String,
    },
    Decoded {
        router_sn: String,
        panel_id: i32,
    },
}

impl Topic {
    pub fn router_sn(&self) -> &str {
        match self {
            Topic::Telemetry { router_sn } => router_sn,
            Topic::Decoded { router_sn, .. } => router_sn,
        }
    }
}

/// 按段切分解析；不匹配的主题返回 None，由调用方计数后丢弃。
pub fn parse_topic(topic: &str) -> Option<Topic> {
    let segments: Vec<&str> = topic.split('/').collect();
    match segments.as_slice() {
        ["cg", "v1", "telemetry", "SN", router_sn] if !router_sn.is_empty() => {
            Some(Topic::Telemetry {
                router_sn: (*router_sn).to_string(),
            })
        }
        ["cg", "v1", "decoded", "SN", router_sn, "pcc", panel] if !router_sn.is_empty() => {
            let panel_id = panel.parse::<i32>().ok()?;
            Some(Topic::Decoded {
                router_sn: (*router_sn).to_string(),
                panel_id,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_topic_parses() {
        assert_eq!(
            parse_topic("cg/v1/telemetry/SN/ABC123"),
            Some(Topic::Telemetry {
                router_sn: "ABC123".to_string()
            })
        );
    }

    #[test]
    fn decoded_topic_parses() {
        assert_eq!(
            parse_topic("cg/v1/decoded/SN/ABC123/pcc/2"),
            Some(Topic::Decoded {
                router_sn: "ABC123".to_string(),
                panel_id: 2
            })
        );
    }

    #[test]
    fn malformed_topics_rejected() {
        for topic in [
            "cg/v1/telemetry/SN",
            "cg/v1/telemetry/SN/",
            "cg/v1/decoded/SN/ABC/pcc/x",
            "cg/v1/decoded/SN/ABC/bess/1",
            "cg/v2/telemetry/SN/ABC",
            "cg/v1/telemetry/SN/ABC/extra",
            "",
        ] {
            assert_eq!(parse_topic(topic), None, "topic = {topic:?}");
        }
    }
}
