//! GPS 存储的内存实现。

use crate::error::StorageError;
use crate::models::GpsRawRecord;
use crate::traits::GpsStore;
use chrono::{DateTime, Utc};
use domain::GpsFix;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Default)]
pub struct InMemoryGpsStore {
    raw: RwLock<Vec<(i64, GpsRawRecord)>>,
    latest: RwLock<HashMap<String, GpsFix>>,
    next_id: AtomicI64,
}

impl InMemoryGpsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试辅助：全部原始流水（按插入序）。
    pub fn raw_rows(&self) -> Vec<GpsRawRecord> {
        self.raw
            .read()
            .map(|raw| raw.iter().map(|(_, record)| record.clone()).collect())
            .unwrap_or_default()
    }

    /// 测试辅助：某对象的最新过滤点。
    pub fn latest_of(&self, router_sn: &str) -> Option<GpsFix> {
        self.latest.read().ok()?.get(router_sn).cloned()
    }

    /// 删除 received_at 早于 cutoff 的最老 batch 行，返回删除数。
    pub(crate) fn purge_older_than(&self, cutoff: DateTime<Utc>, batch: i64) -> u64 {
        let Ok(mut raw) = self.raw.write() else {
            return 0;
        };
        let mut removed = 0u64;
        raw.retain(|(_, record)| {
            if (removed as i64) < batch && record.fix.received_at < cutoff {
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
impl GpsStore for InMemoryGpsStore {
    async fn insert_gps_raw(&self, record: &GpsRawRecord) -> Result<i64, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut raw = self
            .raw
            .write()
            .map_err(|_| StorageError::fatal("lock poisoned"))?;
        raw.push((id, record.clone()));
        Ok(id)
    }

    async fn upsert_gps_latest(&self, router_sn: &str, fix: &GpsFix) -> Result<(), StorageError> {
        let mut latest = self
            .latest
            .write()
            .map_err(|_| StorageError::fatal("lock poisoned"))?;
        latest.insert(router_sn.to_string(), fix.clone());
        Ok(())
    }

    async fn load_gps_latest_all(&self) -> Result<HashMap<String, GpsFix>, StorageError> {
        let latest = self
            .latest
            .read()
            .map_err(|_| StorageError::fatal("lock poisoned"))?;
        Ok(latest.clone())
    }
}
