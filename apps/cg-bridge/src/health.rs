//! health 探针：检查 PostgreSQL（连接 + 期望表）与 MQTT（连接握手）。

use cg_config::AppConfig;
use cg_ingest::MqttConfig;
use cg_storage::{EXPECTED_TABLES, connect_pool};
use sqlx::Row;
use std::error::Error;
use std::time::Duration;

const MQTT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 全量探测；任何一项失败返回 Err（退出码 1）。
pub async fn probe(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    println!("== postgres ==");
    let pg_ok = check_postgres(config).await;
    println!();
    println!("== mqtt ==");
    let mqtt_ok = check_mqtt(&config.mqtt).await;

    println!();
    println!(
        "postgres: {}  mqtt: {}",
        if pg_ok { "ok" } else { "FAILED" },
        if mqtt_ok { "ok" } else { "FAILED" }
    );
    if pg_ok && mqtt_ok {
        Ok(())
    } else {
        Err("health probe failed".into())
    }
}

async fn check_postgres(config: &AppConfig) -> bool {
    let pg = &config.postgres;
    println!("  host: {}:{}  db: {}", pg.host, pg.port, pg.database);

    let pool = match connect_pool(pg).await {
        Ok(pool) => pool,
        Err(err) => {
            println!("  connect FAILED: {err}");
            return false;
        }
    };
    println!("  connect: ok");

    let rows = match sqlx::query("SELECT tablename FROM pg_tables WHERE schemaname = 'public'")
        .fetch_all(&pool)
        .await
    {
        Ok(rows) => rows,
        Err(err) => {
            println!("  table listing FAILED: {err}");
            pool.close().await;
            return false;
        }
    };
    let existing: Vec<String> = rows
        .iter()
        .filter_map(|row| row.try_get::<String, _>("tablename").ok())
        .collect();
    let missing: Vec<&str> = EXPECTED_TABLES
        .iter()
        .copied()
        .filter(|table| !existing.iter().any(|name| name == table))
        .collect();
    if !missing.is_empty() {
        println!("  missing tables: {}", missing.join(", "));
        println!("  run: cg-bridge setup --config <PATH>");
        pool.close().await;
        return false;
    }
    println!("  tables: all present");

    for table in EXPECTED_TABLES {
        let count: Result<i64, _> = sqlx::query(&format!("SELECT count(*) AS n FROM \"{table}\""))
            .fetch_one(&pool)
            .await
            .and_then(|row| row.try_get("n"));
        match count {
            Ok(count) => println!("    {table:<22} {count:>10}"),
            Err(err) => println!("    {table:<22} count failed: {err}"),
        }
    }

    pool.close().await;
    true
}

async fn check_mqtt(config: &MqttConfig) -> bool {
    println!("  host: {}:{}", config.host, config.port);

    let mut options =
        rumqttc::MqttOptions::new("cg-health-check", config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(5));
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }
    if config.tls {
        options.set_transport(rumqttc::Transport::tls_with_default_config());
    }

    let (_client, mut eventloop) = rumqttc::AsyncClient::new(options, 4);
    let deadline = tokio::time::Instant::now() + MQTT_PROBE_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            println!("  connect FAILED: timeout");
            return false;
        }
        match tokio::time::timeout(remaining, eventloop.poll()).await {
            Ok(Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)))) => {
                println!("  connect: ok");
                return true;
            }
            Ok(Ok(_)) => continue,
            Ok(Err(err)) => {
                println!("  connect FAILED: {err}");
                return false;
            }
            Err(_) => {
                println!("  connect FAILED: timeout");
                return false;
            }
        }
    }
}
