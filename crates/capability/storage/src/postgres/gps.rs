//! GPS 流水与最新过滤点的 Postgres 实现。

use crate::error::StorageError;
use crate::models::GpsRawRecord;
use crate::traits::GpsStore;
use domain::GpsFix;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

pub struct PgGpsStore {
    pool: PgPool,
}

impl PgGpsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl GpsStore for PgGpsStore {
    async fn insert_gps_raw(&self, record: &GpsRawRecord) -> Result<i64, StorageError> {
        let row = sqlx::query(
            "INSERT INTO gps_raw_history \
             (router_sn, gps_time, received_at, lat, lon, satellites, fix_status, accepted, reject_reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id",
        )
        .bind(&record.router_sn)
        .bind(record.fix.gps_time)
        .bind(record.fix.received_at)
        .bind(record.fix.lat)
        .bind(record.fix.lon)
        .bind(record.fix.satellites)
        .bind(record.fix.fix_status)
        .bind(record.accepted)
        .bind(record.reject_reason.map(|reason| reason.as_str()))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn upsert_gps_latest(&self, router_sn: &str, fix: &GpsFix) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO gps_latest_filtered \
             (router_sn, gps_time, received_at, lat, lon, satellites, fix_status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (router_sn) DO UPDATE SET \
               gps_time    = EXCLUDED.gps_time, \
               received_at = EXCLUDED.received_at, \
               lat         = EXCLUDED.lat, \
               lon         = EXCLUDED.lon, \
               satellites  = EXCLUDED.satellites, \
               fix_status  = EXCLUDED.fix_status",
        )
        .bind(router_sn)
        .bind(fix.gps_time)
        .bind(fix.received_at)
        .bind(fix.lat)
        .bind(fix.lon)
        .bind(fix.satellites)
        .bind(fix.fix_status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_gps_latest_all(&self) -> Result<HashMap<String, GpsFix>, StorageError> {
        let rows = sqlx::query(
            "SELECT router_sn, gps_time, received_at, lat, lon, satellites, fix_status \
             FROM gps_latest_filtered",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut fixes = HashMap::with_capacity(rows.len());
        for row in rows {
            let router_sn: String = row.try_get("router_sn")?;
            fixes.insert(
                router_sn,
                GpsFix {
                    lat: row.try_get("lat")?,
                    lon: row.try_get("lon")?,
                    satellites: row.try_get("satellites")?,
                    fix_status: row.try_get("fix_status")?,
                    gps_time: row.try_get("gps_time")?,
                    received_at: row.try_get("received_at")?,
                },
            );
        }
        Ok(fixes)
    }
}
