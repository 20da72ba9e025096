//! 数据库模式初始化
//!
//! 全部 DDL 为 CREATE ... IF NOT EXISTS，可在每次启动前安全重放。
//! 由 `cg-bridge setup` 调用；运行态代码假定模式已就绪。

use crate::error::StorageError;
use sqlx::PgPool;

const DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS objects (
        router_sn   TEXT PRIMARY KEY,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS equipment (
        router_sn      TEXT NOT NULL,
        equip_type     TEXT NOT NULL,
        panel_id       INT  NOT NULL,
        first_seen_at  TIMESTAMPTZ NOT NULL,
        last_seen_at   TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (router_sn, equip_type, panel_id)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS register_catalog (
        equip_type        TEXT NOT NULL,
        addr              INT  NOT NULL,
        name_default      TEXT,
        unit_default      TEXT,
        value_kind        TEXT NOT NULL DEFAULT 'analog',
        tolerance         DOUBLE PRECISION,
        min_interval_sec  INT,
        heartbeat_sec     INT,
        store_history     BOOLEAN NOT NULL DEFAULT TRUE,
        PRIMARY KEY (equip_type, addr)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gps_raw_history (
        id             BIGSERIAL PRIMARY KEY,
        router_sn      TEXT NOT NULL,
        gps_time       TIMESTAMPTZ,
        received_at    TIMESTAMPTZ NOT NULL,
        lat            DOUBLE PRECISION NOT NULL,
        lon            DOUBLE PRECISION NOT NULL,
        satellites     INT,
        fix_status     INT,
        accepted       BOOLEAN NOT NULL,
        reject_reason  TEXT
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gps_latest_filtered (
        router_sn    TEXT PRIMARY KEY,
        gps_time     TIMESTAMPTZ,
        received_at  TIMESTAMPTZ NOT NULL,
        lat          DOUBLE PRECISION NOT NULL,
        lon          DOUBLE PRECISION NOT NULL,
        satellites   INT,
        fix_status   INT
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS latest_state (
        router_sn   TEXT NOT NULL,
        equip_type  TEXT NOT NULL,
        panel_id    INT  NOT NULL,
        addr        INT  NOT NULL,
        ts          TIMESTAMPTZ,
        value       DOUBLE PRECISION,
        raw         BIGINT,
        text        TEXT,
        unit        TEXT,
        name        TEXT,
        reason      TEXT,
        updated_at  TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (router_sn, equip_type, panel_id, addr)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS history (
        id            BIGSERIAL PRIMARY KEY,
        router_sn     TEXT NOT NULL,
        equip_type    TEXT NOT NULL,
        panel_id      INT  NOT NULL,
        addr          INT  NOT NULL,
        ts            TIMESTAMPTZ,
        received_at   TIMESTAMPTZ NOT NULL,
        value         DOUBLE PRECISION,
        raw           BIGINT,
        text          TEXT,
        reason        TEXT,
        write_reason  TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id           BIGSERIAL PRIMARY KEY,
        router_sn    TEXT NOT NULL,
        equip_type   TEXT,
        panel_id     INT,
        type         TEXT NOT NULL,
        description  TEXT,
        payload      JSONB,
        created_at   TIMESTAMPTZ NOT NULL
    );
    "#,
    // retention 与恢复路径的常用索引
    r#"
    CREATE INDEX IF NOT EXISTS idx_gps_raw_history_received_at
        ON gps_raw_history (received_at);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_history_received_at
        ON history (received_at);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_history_key_ts
        ON history (router_sn, equip_type, panel_id, addr, received_at);
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_events_created_at
        ON events (created_at);
    "#,
];

/// 应用全部 DDL（单事务，幂等）。
pub async fn apply_schema(pool: &PgPool) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;
    for statement in DDL {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// health 探针要求存在的表。
pub const EXPECTED_TABLES: &[&str] = &[
    "objects",
    "equipment",
    "register_catalog",
    "gps_raw_history",
    "gps_latest_filtered",
    "latest_state",
    "history",
    "events",
];
