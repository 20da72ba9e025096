//! retention 有界删除的 Postgres 实现。

use crate::error::StorageError;
use crate::models::RetentionTable;
use crate::traits::RetentionStore;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct PgRetentionStore {
    pool: PgPool,
}

impl PgRetentionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RetentionStore for PgRetentionStore {
    async fn delete_older_than(
        &self,
        table: RetentionTable,
        cutoff: DateTime<Utc>,
        batch_size: i64,
    ) -> Result<u64, StorageError> {
        // 表名/列名来自封闭枚举，子查询限制单事务删除量
        let sql = format!(
            "DELETE FROM {table} WHERE id IN ( \
               SELECT id FROM {table} WHERE {column} < $1 ORDER BY id LIMIT $2 \
             )",
            table = table.table(),
            column = table.column(),
        );
        let result = sqlx::query(&sql)
            .bind(cutoff)
            .bind(batch_size)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
