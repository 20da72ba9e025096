//! 寄存器目录的内存实现。

use crate::error::StorageError;
use crate::traits::CatalogStore;
use domain::{CatalogEntry, CatalogKey};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryCatalogStore {
    entries: RwLock<HashMap<CatalogKey, CatalogEntry>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试辅助：预置一条目录项。
    pub fn put(&self, equip_type: &str, addr: i32, entry: CatalogEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                CatalogKey {
                    equip_type: equip_type.to_string(),
                    addr,
                },
                entry,
            );
        }
    }
}

#[async_trait::async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn load_catalog(&self) -> Result<HashMap<CatalogKey, CatalogEntry>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::fatal("lock poisoned"))?;
        Ok(entries.clone())
    }
}
