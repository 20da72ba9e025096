//! 对象 / 设备的内存实现。

use crate::error::StorageError;
use crate::traits::ObjectStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryObjectStore {
    // router_sn → (created_at, updated_at)
    objects: RwLock<HashMap<String, (DateTime<Utc>, DateTime<Utc>)>>,
    // (router_sn, equip_type, panel_id) → (first_seen_at, last_seen_at)
    equipment: RwLock<HashMap<(String, String, i32), (DateTime<Utc>, DateTime<Utc>)>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn equipment_last_seen(
        &self,
        router_sn: &str,
        equip_type: &str,
        panel_id: i32,
    ) -> Option<DateTime<Utc>> {
        let equipment = self.equipment.read().ok()?;
        equipment
            .get(&(router_sn.to_string(), equip_type.to_string(), panel_id))
            .map(|(_, last_seen)| *last_seen)
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upsert_object(&self, router_sn: &str, now: DateTime<Utc>) -> Result<(), StorageError> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StorageError::fatal("lock poisoned"))?;
        objects
            .entry(router_sn.to_string())
            .and_modify(|(_, updated_at)| *updated_at = now)
            .or_insert((now, now));
        Ok(())
    }

    async fn upsert_equipment(
        &self,
        router_sn: &str,
        equip_type: &str,
        panel_id: i32,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut equipment = self
            .equipment
            .write()
            .map_err(|_| StorageError::fatal("lock poisoned"))?;
        equipment
            .entry((router_sn.to_string(), equip_type.to_string(), panel_id))
            .and_modify(|(_, last_seen)| *last_seen = now)
            .or_insert((now, now));
        Ok(())
    }
}
