//! # CG Storage 模块
//!
//! 本模块是遥测桥的持久化端口：对象、设备、寄存器目录、GPS 流水、
//! latest_state、history、events 七类资源的抽象存取层。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：按资源拆分的异步 Trait 接口
//! 2. **数据模型层** (`models.rs`)：以“行”为单位的存取结构
//! 3. **错误处理层** (`error.rs`)：Transient/Fatal 二分的存储错误
//! 4. **连接管理层** (`connection.rs`)：按配置建立 Postgres 连接池
//! 5. **目录缓存层** (`catalog.rs`)：寄存器策略的进程内缓存
//! 6. **模式管理层** (`schema.rs`)：幂等 DDL（setup 命令使用）
//! 7. **实现层**：
//!    - `in_memory/`：内存实现（测试与演示）
//!    - `postgres/`：PostgreSQL 实现（生产环境）
//!
//! ## 核心约束
//!
//! - **时钟外置**：所有写入的时间戳由调用方注入，实现不读系统时钟，
//!   保证策略层在测试中可完全确定
//! - **写序即原子**：latest_state 永远先于关联的 history 行写入，
//!   崩溃不会留下没有 latest_state 的 history
//! - **有界删除**：retention 单次调用的删除量由 batch_size 限制，
//!   不产生长事务
//! - **单行原子**：upsert 对并发读者原子（Postgres ON CONFLICT）
//!
//! ## 错误语义
//!
//! 连接与超时类故障映射为 `StorageError::Transient`，由上层按配置
//! 重试；约束冲突、模式缺失、解码失败映射为 `StorageError::Fatal`，
//! 上层转为停机。

pub mod catalog;
pub mod connection;
pub mod error;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod schema;
pub mod traits;

pub use catalog::CatalogCache;
pub use connection::{PostgresConfig, connect_pool};
pub use error::StorageError;
pub use models::{GpsRawRecord, HistoryRecord, LatestStateRecord, RetentionTable};
pub use schema::{EXPECTED_TABLES, apply_schema};
pub use traits::{
    CatalogStore, EventStore, GpsStore, HistoryStore, ObjectStore, RetentionStore, StateStore,
};

pub use in_memory::{
    InMemoryCatalogStore, InMemoryEventStore, InMemoryGpsStore, InMemoryHistoryStore,
    InMemoryObjectStore, InMemoryRetentionStore, InMemoryStateStore,
};

pub use postgres::{
    PgCatalogStore, PgEventStore, PgGpsStore, PgHistoryStore, PgObjectStore, PgRetentionStore,
    PgStateStore,
};
