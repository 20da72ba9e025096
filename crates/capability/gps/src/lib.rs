//! GPS 反瞬移过滤器。
//!
//! 每个 router_sn 持有一个 [`GpsFilter`] 实例：接受稳定的坐标流，
//! 拒绝距离/速度上不可能的跳点；连续多个彼此邻近的远点通过
//! 确认缓冲判定为真实移动后整体放行。判定为纯内存计算，不做 I/O。

use domain::{GpsFix, RejectReason};
use serde::Deserialize;
use tracing::info;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// 两坐标点的大圆距离（米，Haversine）。
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let r_lat1 = lat1.to_radians();
    let r_lat2 = lat2.to_radians();
    let d_lat = r_lat2 - r_lat1;
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + r_lat1.cos() * r_lat2.cos() * (d_lon / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// 过滤器参数。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpsFilterConfig {
    pub sats_min: i32,
    pub fix_min: i32,
    pub max_jump_m: f64,
    pub max_speed_kmh: f64,
    pub confirm_points: usize,
    pub confirm_radius_m: f64,
}

impl Default for GpsFilterConfig {
    fn default() -> Self {
        Self {
            sats_min: 4,
            fix_min: 1,
            max_jump_m: 1000.0,
            max_speed_kmh: 150.0,
            confirm_points: 3,
            confirm_radius_m: 50.0,
        }
    }
}

/// 单点判定结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsVerdict {
    pub accepted: bool,
    pub reject_reason: Option<RejectReason>,
}

impl GpsVerdict {
    fn accept() -> Self {
        Self {
            accepted: true,
            reject_reason: None,
        }
    }

    fn reject(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            reject_reason: Some(reason),
        }
    }
}

/// 反瞬移过滤器，一个实例对应一个 router_sn。
#[derive(Debug, Clone, Default)]
pub struct GpsFilter {
    last_accepted: Option<GpsFix>,
    confirm: Vec<GpsFix>,
}

impl GpsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_accepted(&self) -> Option<&GpsFix> {
        self.last_accepted.as_ref()
    }

    /// 启动时从 gps_latest_filtered 恢复最后接受点；缓冲保持为空。
    pub fn set_initial(&mut self, fix: GpsFix) {
        self.last_accepted = Some(fix);
        self.confirm.clear();
    }

    /// 判定一个定位点。接受时更新内部状态；质量门拒绝不改动任何状态。
    pub fn check(&mut self, cfg: &GpsFilterConfig, fix: &GpsFix) -> GpsVerdict {
        // 质量门：卫星数 / 定位状态
        if fix.satellites.is_some_and(|sats| sats < cfg.sats_min) {
            return GpsVerdict::reject(RejectReason::LowSats);
        }
        if fix.fix_status.is_some_and(|status| status < cfg.fix_min) {
            return GpsVerdict::reject(RejectReason::BadFix);
        }

        let Some(last) = self.last_accepted.as_ref() else {
            // 首点无参照，直接接受
            self.accept(fix);
            return GpsVerdict::accept();
        };

        let dist_m = haversine_m(last.lat, last.lon, fix.lat, fix.lon);
        if dist_m <= cfg.max_jump_m {
            self.accept(fix);
            return GpsVerdict::accept();
        }

        // 距离超限但间隔足够长：按隐含速度放行慢速长途移动
        let dt_sec = (fix.received_at - last.received_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;
        let dt_sec = dt_sec.max(1.0);
        let speed_kmh = dist_m / dt_sec * 3.6;
        if speed_kmh <= cfg.max_speed_kmh {
            self.accept(fix);
            return GpsVerdict::accept();
        }

        let reason = if dist_m > cfg.max_jump_m {
            RejectReason::JumpDistance
        } else {
            RejectReason::JumpSpeed
        };
        self.try_confirm(cfg, fix, dist_m, reason)
    }

    fn accept(&mut self, fix: &GpsFix) {
        self.last_accepted = Some(fix.clone());
        self.confirm.clear();
    }

    /// 远点进入确认缓冲：触发跳变的首个远点只开启一轮确认，不计入
    /// 确认数；其后凑满 confirm_points 个两两处于 confirm_radius_m
    /// 内的点即判定为真实移动。
    fn try_confirm(
        &mut self,
        cfg: &GpsFilterConfig,
        fix: &GpsFix,
        dist_m: f64,
        reason: RejectReason,
    ) -> GpsVerdict {
        if let Some(first) = self.confirm.first() {
            let d_to_first = haversine_m(first.lat, first.lon, fix.lat, fix.lon);
            if d_to_first > cfg.confirm_radius_m {
                // 又一个离群点，缓冲从它重新开始
                self.confirm.clear();
                self.confirm.push(fix.clone());
                return GpsVerdict::reject(reason);
            }
        }
        self.confirm.push(fix.clone());

        if self.confirm.len() > cfg.confirm_points && self.cluster_confirmed(cfg) {
            info!(
                target: "cg.gps",
                points = self.confirm.len(),
                radius_m = cfg.confirm_radius_m,
                dist_m,
                "gps_move_confirmed"
            );
            self.accept(fix);
            return GpsVerdict::accept();
        }
        GpsVerdict::reject(reason)
    }

    fn cluster_confirmed(&self, cfg: &GpsFilterConfig) -> bool {
        for (i, a) in self.confirm.iter().enumerate() {
            for b in self.confirm.iter().skip(i + 1) {
                if haversine_m(a.lat, a.lon, b.lat, b.lon) > cfg.confirm_radius_m {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(sec: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + sec, 0).unwrap()
    }

    fn fix(lat: f64, lon: f64, sec: i64) -> GpsFix {
        GpsFix {
            lat,
            lon,
            satellites: Some(8),
            fix_status: Some(1),
            gps_time: None,
            received_at: at(sec),
        }
    }

    // 基准点（测试中约定为“圣彼得堡侧”），相距约 635 km 的远点为“莫斯科侧”。
    const HOME: (f64, f64) = (59.851624, 30.479838);
    const FAR: (f64, f64) = (55.751244, 37.618423);

    #[test]
    fn first_fix_accepted() {
        let cfg = GpsFilterConfig::default();
        let mut filter = GpsFilter::new();
        let verdict = filter.check(&cfg, &fix(HOME.0, HOME.1, 0));
        assert!(verdict.accepted);
        assert_eq!(filter.last_accepted().unwrap().lat, HOME.0);
    }

    #[test]
    fn quality_gates_reject_without_touching_state() {
        let cfg = GpsFilterConfig::default();
        let mut filter = GpsFilter::new();
        assert!(filter.check(&cfg, &fix(HOME.0, HOME.1, 0)).accepted);

        let mut low = fix(FAR.0, FAR.1, 60);
        low.satellites = Some(3);
        let verdict = filter.check(&cfg, &low);
        assert_eq!(verdict.reject_reason, Some(RejectReason::LowSats));

        let mut bad = fix(FAR.0, FAR.1, 120);
        bad.fix_status = Some(0);
        let verdict = filter.check(&cfg, &bad);
        assert_eq!(verdict.reject_reason, Some(RejectReason::BadFix));

        // 最后接受点保持为首点
        assert_eq!(filter.last_accepted().unwrap().lat, HOME.0);
    }

    #[test]
    fn nearby_fix_accepted() {
        let cfg = GpsFilterConfig::default();
        let mut filter = GpsFilter::new();
        assert!(filter.check(&cfg, &fix(HOME.0, HOME.1, 0)).accepted);
        // 向北约 11 米
        let verdict = filter.check(&cfg, &fix(HOME.0 + 0.0001, HOME.1, 10));
        assert!(verdict.accepted);
        assert_eq!(filter.last_accepted().unwrap().lat, HOME.0 + 0.0001);
    }

    #[test]
    fn teleport_rejected_with_jump_distance() {
        let cfg = GpsFilterConfig::default();
        let mut filter = GpsFilter::new();
        assert!(filter.check(&cfg, &fix(HOME.0, HOME.1, 0)).accepted);

        let verdict = filter.check(&cfg, &fix(FAR.0, FAR.1, 60));
        assert!(!verdict.accepted);
        assert_eq!(verdict.reject_reason, Some(RejectReason::JumpDistance));
        // latest 不变
        assert_eq!(filter.last_accepted().unwrap().lat, HOME.0);
    }

    #[test]
    fn slow_long_move_accepted_by_speed() {
        let cfg = GpsFilterConfig::default();
        let mut filter = GpsFilter::new();
        assert!(filter.check(&cfg, &fix(HOME.0, HOME.1, 0)).accepted);
        // 一小时移动约 2 km：距离超 max_jump_m 但隐含速度仅 ~2 km/h
        let verdict = filter.check(&cfg, &fix(HOME.0 + 0.018, HOME.1, 3600));
        assert!(verdict.accepted);
    }

    #[test]
    fn cluster_of_candidates_confirms_move() {
        let cfg = GpsFilterConfig::default();
        let mut filter = GpsFilter::new();
        assert!(filter.check(&cfg, &fix(HOME.0, HOME.1, 0)).accepted);

        // 触发跳变的远点 + 两个确认点都被拒绝，第三个确认点放行
        assert!(!filter.check(&cfg, &fix(FAR.0, FAR.1, 60)).accepted);
        assert!(!filter.check(&cfg, &fix(FAR.0 + 0.0001, FAR.1, 120)).accepted);
        assert!(!filter.check(&cfg, &fix(FAR.0 + 0.0002, FAR.1, 180)).accepted);
        let verdict = filter.check(&cfg, &fix(FAR.0 + 0.0001, FAR.1 + 0.0001, 240));
        assert!(verdict.accepted);
        assert_eq!(filter.last_accepted().unwrap().lon, FAR.1 + 0.0001);
    }

    #[test]
    fn scattered_candidate_restarts_buffer() {
        let cfg = GpsFilterConfig::default();
        let mut filter = GpsFilter::new();
        assert!(filter.check(&cfg, &fix(HOME.0, HOME.1, 0)).accepted);

        assert!(!filter.check(&cfg, &fix(FAR.0, FAR.1, 60)).accepted);
        // 离群方向完全不同的点：缓冲重置，仍被拒绝
        assert!(!filter.check(&cfg, &fix(50.0, 20.0, 120)).accepted);
        // 从新位置重新凑簇
        assert!(!filter.check(&cfg, &fix(50.0001, 20.0, 180)).accepted);
        assert!(!filter.check(&cfg, &fix(50.0002, 20.0, 240)).accepted);
        let verdict = filter.check(&cfg, &fix(50.0001, 20.0001, 300));
        assert!(verdict.accepted);
    }

    #[test]
    fn quality_reject_preserves_confirm_buffer() {
        let cfg = GpsFilterConfig::default();
        let mut filter = GpsFilter::new();
        assert!(filter.check(&cfg, &fix(HOME.0, HOME.1, 0)).accepted);

        assert!(!filter.check(&cfg, &fix(FAR.0, FAR.1, 60)).accepted);
        let mut low = fix(FAR.0, FAR.1, 90);
        low.satellites = Some(2);
        assert!(!filter.check(&cfg, &low).accepted);
        // 缓冲未被质量门清空，三个邻近确认点依旧凑满一簇
        assert!(!filter.check(&cfg, &fix(FAR.0 + 0.0001, FAR.1, 120)).accepted);
        assert!(!filter.check(&cfg, &fix(FAR.0 + 0.0002, FAR.1, 180)).accepted);
        assert!(filter.check(&cfg, &fix(FAR.0 + 0.0001, FAR.1 + 0.0001, 240)).accepted);
    }

    #[test]
    fn haversine_known_distance() {
        // 圣彼得堡 → 莫斯科，约 635 km
        let d = haversine_m(HOME.0, HOME.1, FAR.0, FAR.1);
        assert!((600_000.0..700_000.0).contains(&d), "d = {d}");
    }
}
