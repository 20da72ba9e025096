//! 对象 / 设备的 Postgres 实现。

use crate::error::StorageError;
use crate::traits::ObjectStore;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct PgObjectStore {
    pool: PgPool,
}

impl PgObjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ObjectStore for PgObjectStore {
    async fn upsert_object(&self, router_sn: &str, now: DateTime<Utc>) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO objects (router_sn, created_at, updated_at) VALUES ($1, $2, $2) \
             ON CONFLICT (router_sn) DO UPDATE SET updated_at = EXCLUDED.updated_at",
        )
        .bind(router_sn)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_equipment(
        &self,
        router_sn: &str,
        equip_type: &str,
        panel_id: i32,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO equipment (router_sn, equip_type, panel_id, first_seen_at, last_seen_at) \
             VALUES ($1, $2, $3, $4, $4) \
             ON CONFLICT (router_sn, equip_type, panel_id) \
             DO UPDATE SET last_seen_at = EXCLUDED.last_seen_at",
        )
        .bind(router_sn)
        .bind(equip_type)
        .bind(panel_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
