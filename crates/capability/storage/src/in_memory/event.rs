//! 事件存储的内存实现。

use crate::error::StorageError;
use crate::traits::EventStore;
use chrono::{DateTime, Utc};
use domain::{EventRecord, EventType};
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<(EventRecord, DateTime<Utc>)>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试辅助：全部事件（按插入序）。
    pub fn events(&self) -> Vec<EventRecord> {
        self.events
            .read()
            .map(|events| events.iter().map(|(record, _)| record.clone()).collect())
            .unwrap_or_default()
    }

    /// 测试辅助：某类型事件的数量。
    pub fn count_of(&self, event_type: EventType) -> usize {
        self.events
            .read()
            .map(|events| {
                events
                    .iter()
                    .filter(|(record, _)| record.event_type == event_type)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn purge_older_than(&self, cutoff: DateTime<Utc>, batch: i64) -> u64 {
        let Ok(mut events) = self.events.write() else {
            return 0;
        };
        let mut removed = 0u64;
        events.retain(|(_, created_at)| {
            if (removed as i64) < batch && *created_at < cutoff {
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
impl EventStore for InMemoryEventStore {
    async fn insert_event(
        &self,
        event: &EventRecord,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| StorageError::fatal("lock poisoned"))?;
        events.push((event.clone(), created_at));
        Ok(())
    }
}
