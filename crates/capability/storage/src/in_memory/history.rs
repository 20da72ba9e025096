//! history 的内存实现。

use crate::error::StorageError;
use crate::models::HistoryRecord;
use crate::traits::HistoryStore;
use chrono::{DateTime, Utc};
use domain::{RegisterSample, StateKey, WriteReason};
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryHistoryStore {
    rows: RwLock<Vec<HistoryRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试辅助：全部 history 行（按插入序）。
    pub fn rows(&self) -> Vec<HistoryRecord> {
        self.rows.read().map(|rows| rows.clone()).unwrap_or_default()
    }

    /// 测试辅助：某键的 history 行。
    pub fn rows_for(&self, key: &StateKey) -> Vec<HistoryRecord> {
        self.rows
            .read()
            .map(|rows| rows.iter().filter(|row| &row.key == key).cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn purge_older_than(&self, cutoff: DateTime<Utc>, batch: i64) -> u64 {
        let Ok(mut rows) = self.rows.write() else {
            return 0;
        };
        let mut removed = 0u64;
        rows.retain(|row| {
            if (removed as i64) < batch && row.received_at < cutoff {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn insert_history(
        &self,
        key: &StateKey,
        sample: &RegisterSample,
        write_reason: WriteReason,
        received_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StorageError::fatal("lock poisoned"))?;
        rows.push(HistoryRecord {
            key: key.clone(),
            sample: sample.clone(),
            write_reason,
            received_at,
        });
        Ok(())
    }
}
