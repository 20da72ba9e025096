//! history 追加写的 Postgres 实现。

use crate::error::StorageError;
use crate::traits::HistoryStore;
use chrono::{DateTime, Utc};
use domain::{RegisterSample, StateKey, WriteReason};
use sqlx::PgPool;

pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HistoryStore for PgHistoryStore {
    async fn insert_history(
        &self,
        key: &StateKey,
        sample: &RegisterSample,
        write_reason: WriteReason,
        received_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO history \
             (router_sn, equip_type, panel_id, addr, ts, received_at, value, raw, text, reason, write_reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&key.router_sn)
        .bind(&key.equip_type)
        .bind(key.panel_id)
        .bind(key.addr)
        .bind(sample.ts)
        .bind(received_at)
        .bind(sample.value)
        .bind(sample.raw)
        .bind(&sample.text)
        .bind(&sample.reason)
        .bind(write_reason.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
