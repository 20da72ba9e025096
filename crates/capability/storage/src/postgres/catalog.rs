//! 寄存器目录的 Postgres 装载实现。

use crate::error::StorageError;
use crate::traits::CatalogStore;
use domain::{CatalogEntry, CatalogKey, ValueKind};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::warn;

pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgCatalogStore {
    async fn load_catalog(&self) -> Result<HashMap<CatalogKey, CatalogEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT equip_type, addr, name_default, unit_default, value_kind, \
             tolerance, min_interval_sec, heartbeat_sec, store_history \
             FROM register_catalog",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = HashMap::with_capacity(rows.len());
        for row in rows {
            let equip_type: String = row.try_get("equip_type")?;
            let addr: i32 = row.try_get("addr")?;
            let kind_str: String = row.try_get("value_kind")?;
            let Some(value_kind) = ValueKind::parse(&kind_str) else {
                // 未识别的类别行不应让整个装载失败
                warn!(target: "cg.catalog", equip_type, addr, value_kind = %kind_str, "catalog_kind_unknown");
                continue;
            };
            entries.insert(
                CatalogKey { equip_type, addr },
                CatalogEntry {
                    name_default: row.try_get("name_default")?,
                    unit_default: row.try_get("unit_default")?,
                    value_kind,
                    tolerance: row.try_get("tolerance")?,
                    min_interval_sec: row.try_get::<Option<i32>, _>("min_interval_sec")?.map(i64::from),
                    heartbeat_sec: row.try_get::<Option<i32>, _>("heartbeat_sec")?.map(i64::from),
                    store_history: row.try_get("store_history")?,
                },
            );
        }
        Ok(entries)
    }
}
