//! retention 的内存实现：委托到各资源存储的有界删除。

use crate::error::StorageError;
use crate::in_memory::{InMemoryEventStore, InMemoryGpsStore, InMemoryHistoryStore};
use crate::models::RetentionTable;
use crate::traits::RetentionStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct InMemoryRetentionStore {
    gps: Arc<InMemoryGpsStore>,
    history: Arc<InMemoryHistoryStore>,
    events: Arc<InMemoryEventStore>,
}

impl InMemoryRetentionStore {
    pub fn new(
        gps: Arc<InMemoryGpsStore>,
        history: Arc<InMemoryHistoryStore>,
        events: Arc<InMemoryEventStore>,
    ) -> Self {
        Self {
            gps,
            history,
            events,
        }
    }
}

#[async_trait::async_trait]
impl RetentionStore for InMemoryRetentionStore {
    async fn delete_older_than(
        &self,
        table: RetentionTable,
        cutoff: DateTime<Utc>,
        batch_size: i64,
    ) -> Result<u64, StorageError> {
        let removed = match table {
            RetentionTable::GpsRawHistory => self.gps.purge_older_than(cutoff, batch_size),
            RetentionTable::History => self.history.purge_older_than(cutoff, batch_size),
            RetentionTable::Events => self.events.purge_older_than(cutoff, batch_size),
        };
        Ok(removed)
    }
}
