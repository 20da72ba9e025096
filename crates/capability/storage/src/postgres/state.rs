//! latest_state 的 Postgres 实现。

use crate::error::StorageError;
use crate::models::LatestStateRecord;
use crate::traits::StateStore;
use chrono::{DateTime, Utc};
use domain::{RegisterSample, StateKey};
use sqlx::{PgPool, Row};

pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StateStore for PgStateStore {
    async fn upsert_latest_state(
        &self,
        key: &StateKey,
        sample: &RegisterSample,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO latest_state \
             (router_sn, equip_type, panel_id, addr, ts, value, raw, text, unit, name, reason, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (router_sn, equip_type, panel_id, addr) DO UPDATE SET \
               ts         = EXCLUDED.ts, \
               value      = EXCLUDED.value, \
               raw        = EXCLUDED.raw, \
               text       = EXCLUDED.text, \
               unit       = EXCLUDED.unit, \
               name       = EXCLUDED.name, \
               reason     = EXCLUDED.reason, \
               updated_at = EXCLUDED.updated_at",
        )
        .bind(&key.router_sn)
        .bind(&key.equip_type)
        .bind(key.panel_id)
        .bind(key.addr)
        .bind(sample.ts)
        .bind(sample.value)
        .bind(sample.raw)
        .bind(&sample.text)
        .bind(&sample.unit)
        .bind(&sample.name)
        .bind(&sample.reason)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_latest_state_all(&self) -> Result<Vec<LatestStateRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT router_sn, equip_type, panel_id, addr, ts, value, raw, text, unit, name, reason, updated_at \
             FROM latest_state",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(LatestStateRecord {
                key: StateKey {
                    router_sn: row.try_get("router_sn")?,
                    equip_type: row.try_get("equip_type")?,
                    panel_id: row.try_get("panel_id")?,
                    addr: row.try_get("addr")?,
                },
                sample: RegisterSample {
                    ts: row.try_get("ts")?,
                    value: row.try_get("value")?,
                    raw: row.try_get("raw")?,
                    text: row.try_get("text")?,
                    unit: row.try_get("unit")?,
                    name: row.try_get("name")?,
                    reason: row.try_get("reason")?,
                },
                updated_at: row.try_get("updated_at")?,
            });
        }
        Ok(records)
    }
}
