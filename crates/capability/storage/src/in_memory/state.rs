//! latest_state 的内存实现。

use crate::error::StorageError;
use crate::models::LatestStateRecord;
use crate::traits::StateStore;
use chrono::{DateTime, Utc};
use domain::{RegisterSample, StateKey};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStateStore {
    rows: RwLock<HashMap<StateKey, (RegisterSample, DateTime<Utc>)>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试辅助：读取一行当前状态。
    pub fn get(&self, key: &StateKey) -> Option<RegisterSample> {
        self.rows.read().ok()?.get(key).map(|(sample, _)| sample.clone())
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 测试辅助：预置一行（模拟热重启前的库内状态）。
    pub fn put(&self, key: StateKey, sample: RegisterSample, updated_at: DateTime<Utc>) {
        if let Ok(mut rows) = self.rows.write() {
            rows.insert(key, (sample, updated_at));
        }
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn upsert_latest_state(
        &self,
        key: &StateKey,
        sample: &RegisterSample,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StorageError::fatal("lock poisoned"))?;
        rows.insert(key.clone(), (sample.clone(), now));
        Ok(())
    }

    async fn load_latest_state_all(&self) -> Result<Vec<LatestStateRecord>, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::fatal("lock poisoned"))?;
        Ok(rows
            .iter()
            .map(|(key, (sample, updated_at))| LatestStateRecord {
                key: key.clone(),
                sample: sample.clone(),
                updated_at: *updated_at,
            })
            .collect())
    }
}
