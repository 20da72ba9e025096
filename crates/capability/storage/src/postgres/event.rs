//! 事件追加写的 Postgres 实现。

use crate::error::StorageError;
use crate::traits::EventStore;
use chrono::{DateTime, Utc};
use domain::EventRecord;
use sqlx::PgPool;

pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventStore for PgEventStore {
    async fn insert_event(
        &self,
        event: &EventRecord,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO events (router_sn, equip_type, panel_id, type, description, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&event.router_sn)
        .bind(&event.equip_type)
        .bind(event.panel_id)
        .bind(event.event_type.as_str())
        .bind(&event.description)
        .bind(&event.payload)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
