//! 持久化端口 Trait 定义
//!
//! 按资源拆分的异步接口：
//! - ObjectStore：对象与设备面板 upsert
//! - CatalogStore：寄存器目录装载
//! - GpsStore：GPS 原始流水 / 最新过滤点
//! - StateStore：latest_state 覆盖写与启动恢复
//! - HistoryStore：history 追加
//! - EventStore：事件追加
//! - RetentionStore：按时间水位的有界删除
//!
//! 设计原则：
//! - 所有接口返回 StorageError（Transient/Fatal 二分）
//! - 时间一律由调用方注入，存储实现不读系统时钟
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::{GpsRawRecord, LatestStateRecord, RetentionTable};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{CatalogEntry, CatalogKey, EventRecord, GpsFix, RegisterSample, StateKey, WriteReason};
use std::collections::HashMap;

/// 对象 / 设备存储接口。
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 幂等登记对象，已存在时仅刷新 updated_at。
    async fn upsert_object(&self, router_sn: &str, now: DateTime<Utc>) -> Result<(), StorageError>;

    /// 登记设备面板并刷新 last_seen_at。
    async fn upsert_equipment(
        &self,
        router_sn: &str,
        equip_type: &str,
        panel_id: i32,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// 寄存器目录装载接口。
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load_catalog(&self) -> Result<HashMap<CatalogKey, CatalogEntry>, StorageError>;
}

/// GPS 存储接口。
#[async_trait]
pub trait GpsStore: Send + Sync {
    /// 追加原始流水，返回行 id。
    async fn insert_gps_raw(&self, record: &GpsRawRecord) -> Result<i64, StorageError>;

    /// 覆盖写最新过滤点。
    async fn upsert_gps_latest(&self, router_sn: &str, fix: &GpsFix) -> Result<(), StorageError>;

    /// 启动时装载全部最新过滤点，用于恢复过滤器状态。
    async fn load_gps_latest_all(&self) -> Result<HashMap<String, GpsFix>, StorageError>;
}

/// latest_state 存储接口。
#[async_trait]
pub trait StateStore: Send + Sync {
    /// 覆盖写一行 latest_state（每条观测都调用，无论 history 是否写）。
    async fn upsert_latest_state(
        &self,
        key: &StateKey,
        sample: &RegisterSample,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// 启动时装载全部 latest_state，用于恢复落库策略状态。
    async fn load_latest_state_all(&self) -> Result<Vec<LatestStateRecord>, StorageError>;
}

/// history 存储接口。
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert_history(
        &self,
        key: &StateKey,
        sample: &RegisterSample,
        write_reason: WriteReason,
        received_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// 事件存储接口。
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(
        &self,
        event: &EventRecord,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// retention 删除接口。
#[async_trait]
pub trait RetentionStore: Send + Sync {
    /// 删除时间列早于 cutoff 的行，单次调用最多删 batch_size 行。
    /// 幂等：返回 0 表示该表已无更老的行。
    async fn delete_older_than(
        &self,
        table: RetentionTable,
        cutoff: DateTime<Utc>,
        batch_size: i64,
    ) -> Result<u64, StorageError>;
}
