//! 内存存储实现
//!
//! 仅用于测试与本地演示：`RwLock<HashMap/Vec>` 保存行，语义与
//! Postgres 实现对齐（upsert 覆盖、追加有序、retention 按最老先删）。

mod catalog;
mod event;
mod gps;
mod history;
mod object;
mod retention;
mod state;

pub use catalog::InMemoryCatalogStore;
pub use event::InMemoryEventStore;
pub use gps::InMemoryGpsStore;
pub use history::InMemoryHistoryStore;
pub use object::InMemoryObjectStore;
pub use retention::InMemoryRetentionStore;
pub use state::InMemoryStateStore;
