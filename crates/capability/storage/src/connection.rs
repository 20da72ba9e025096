//! 数据库连接管理
//!
//! 从配置建立 Postgres 连接池；池大小由 pool_min/pool_max 控制，
//! 取连接可能挂起，属于正常的背压点。

use crate::error::StorageError;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Postgres 连接配置。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "cg_telemetry".to_string(),
            user: String::new(),
            password: String::new(),
            pool_min: 2,
            pool_max: 10,
        }
    }
}

impl PostgresConfig {
    pub fn dsn(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// 建立 Postgres 连接池。
pub async fn connect_pool(config: &PostgresConfig) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .min_connections(config.pool_min)
        .max_connections(config.pool_max)
        .connect(&config.dsn())
        .await?;
    Ok(pool)
}
