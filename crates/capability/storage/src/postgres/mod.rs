//! PostgreSQL 存储实现（生产环境）。

mod catalog;
mod event;
mod gps;
mod history;
mod object;
mod retention;
mod state;

pub use catalog::PgCatalogStore;
pub use event::PgEventStore;
pub use gps::PgGpsStore;
pub use history::PgHistoryStore;
pub use object::PgObjectStore;
pub use retention::PgRetentionStore;
pub use state::PgStateStore;
