//! 寄存器目录缓存
//!
//! 启动时整表装入内存，之后所有策略查询都不再回源。只有显式
//! reload 信号会刷新（刷新串行化），缺失键返回 None 即“未知寄存器”。

use crate::error::StorageError;
use crate::traits::CatalogStore;
use domain::{CatalogEntry, CatalogKey};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

/// 目录缓存：读多写少，读侧无锁竞争（RwLock 读锁）。
#[derive(Default)]
pub struct CatalogCache {
    entries: RwLock<HashMap<CatalogKey, CatalogEntry>>,
    reload_gate: tokio::sync::Mutex<()>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从存储整表装载（启动时及显式 reload 时调用，互相串行）。
    pub async fn load(&self, store: &dyn CatalogStore) -> Result<usize, StorageError> {
        let _gate = self.reload_gate.lock().await;
        let loaded = store.load_catalog().await?;
        let count = loaded.len();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::fatal("catalog lock poisoned"))?;
        *entries = loaded;
        info!(target: "cg.catalog", entries = count, "catalog_loaded");
        Ok(count)
    }

    /// 查询单寄存器策略；None 即未知寄存器。
    pub fn get(&self, equip_type: &str, addr: i32) -> Option<CatalogEntry> {
        let entries = self.entries.read().ok()?;
        entries
            .get(&CatalogKey {
                equip_type: equip_type.to_string(),
                addr,
            })
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
