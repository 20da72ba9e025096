//! supervisor：装配存储、目录缓存、管线、分区 worker 与周期任务，
//! 拥有停机编排。

use async_trait::async_trait;
use cg_config::AppConfig;
use cg_ingest::{
    InboundMessage, IngestError, IngestQueue, MessageSink, MqttSource, PushOutcome, parse_topic,
};
use cg_pipeline::{
    IngestPipeline, PipelineError, PipelineStores, retention_loop, run_cleanup, watchdog_loop,
};
use cg_storage::{
    CatalogCache, PgCatalogStore, PgEventStore, PgGpsStore, PgHistoryStore, PgObjectStore,
    PgRetentionStore, PgStateStore, RetentionStore, apply_schema, connect_pool,
};
use cg_telemetry::{record_message_dropped, record_queue_dropped};
use domain::{Clock, SystemClock};
use std::collections::hash_map::DefaultHasher;
use std::error::Error;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 排空队列的最后期限。
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// 常驻运行模式。
pub async fn run(config: AppConfig) -> Result<(), Box<dyn Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pool = connect_pool(&config.postgres).await?;
    info!(
        target: "cg.main",
        pool_min = config.postgres.pool_min,
        pool_max = config.postgres.pool_max,
        "postgres_pool_ready"
    );

    let catalog_store = PgCatalogStore::new(pool.clone());
    let catalog = Arc::new(CatalogCache::new());
    catalog.load(&catalog_store).await?;

    let stores = PipelineStores {
        objects: Arc::new(PgObjectStore::new(pool.clone())),
        gps: Arc::new(PgGpsStore::new(pool.clone())),
        state: Arc::new(PgStateStore::new(pool.clone())),
        history: Arc::new(PgHistoryStore::new(pool.clone())),
        events: Arc::new(PgEventStore::new(pool.clone())),
    };
    let pipeline = Arc::new(IngestPipeline::new(
        stores,
        catalog.clone(),
        clock.clone(),
        config.gps_filter.clone(),
        config.history_policy.clone(),
        config.events_policy.clone(),
        &config.ingest,
    ));
    pipeline.restore().await?;

    // 分区队列：同一 router_sn 恒定落在同一 worker，保序
    let worker_count = config.ingest.worker_count.max(1);
    let per_queue_capacity = (config.ingest.queue_max / worker_count).max(1);
    let queues: Vec<Arc<IngestQueue>> = (0..worker_count)
        .map(|_| Arc::new(IngestQueue::new(per_queue_capacity, config.ingest.drop_oldest)))
        .collect();

    let (fatal_tx, mut fatal_rx) = mpsc::channel::<PipelineError>(1);
    let mut workers = Vec::with_capacity(worker_count);
    for (index, queue) in queues.iter().enumerate() {
        let queue = queue.clone();
        let pipeline = pipeline.clone();
        let fatal_tx = fatal_tx.clone();
        workers.push(tokio::spawn(async move {
            ingest_worker(index, queue, pipeline, fatal_tx).await;
        }));
    }
    drop(fatal_tx);

    let sink = Arc::new(QueueSink {
        queues: queues.clone(),
    });
    let source = MqttSource::new(config.mqtt.clone(), clock.clone());
    let source_task = tokio::spawn(async move { source.run(sink).await });

    let watchdog_task = tokio::spawn(watchdog_loop(pipeline.clone()));
    let retention_store: Arc<dyn RetentionStore> = Arc::new(PgRetentionStore::new(pool.clone()));
    let retention_task = tokio::spawn(retention_loop(
        retention_store,
        config.retention.clone(),
        clock.clone(),
    ));
    let reload_task = tokio::spawn(catalog_reload_loop(catalog.clone(), pool.clone()));

    // 运行直到停机信号或致命存储错误
    let mut fatal: Option<PipelineError> = None;
    tokio::select! {
        _ = shutdown_signal() => {
            info!(target: "cg.main", "shutdown_signal_received");
        }
        received = fatal_rx.recv() => {
            if let Some(err) = received {
                error!(target: "cg.main", error = %err, "fatal_storage_error");
                fatal = Some(err);
            }
        }
    }

    // 停收新消息 → 限时排空 → 取消周期任务 → 关池
    source_task.abort();
    for queue in &queues {
        queue.close().await;
    }
    let deadline = tokio::time::Instant::now() + DRAIN_DEADLINE;
    for mut worker in workers {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if tokio::time::timeout(remaining, &mut worker).await.is_err() {
            warn!(target: "cg.main", "drain_deadline_exceeded");
            worker.abort();
        }
    }
    watchdog_task.abort();
    retention_task.abort();
    reload_task.abort();
    pool.close().await;

    match fatal {
        None => {
            info!(target: "cg.main", "clean_shutdown");
            Ok(())
        }
        Some(err) => Err(Box::new(err)),
    }
}

/// cleanup 模式：一轮 retention 后退出。
pub async fn cleanup_once(config: AppConfig) -> Result<(), Box<dyn Error>> {
    let clock = SystemClock;
    let pool = connect_pool(&config.postgres).await?;
    let store = PgRetentionStore::new(pool.clone());
    let report = run_cleanup(&store, &config.retention, clock.now()).await?;
    info!(
        target: "cg.retention",
        gps_raw = report.gps_raw,
        history = report.history,
        events = report.events,
        capped = report.capped,
        "cleanup_once_done"
    );
    pool.close().await;
    Ok(())
}

/// setup 模式：应用幂等 DDL 后退出。
pub async fn setup_schema(config: AppConfig) -> Result<(), Box<dyn Error>> {
    let pool = connect_pool(&config.postgres).await?;
    apply_schema(&pool).await?;
    info!(target: "cg.main", "schema_applied");
    pool.close().await;
    Ok(())
}

/// worker：独占一条队列，逐条驱动管线；重试耗尽的消息计数后丢弃，
/// 致命错误上报 supervisor。
async fn ingest_worker(
    index: usize,
    queue: Arc<IngestQueue>,
    pipeline: Arc<IngestPipeline>,
    fatal_tx: mpsc::Sender<PipelineError>,
) {
    debug!(target: "cg.ingest", worker = index, "worker_started");
    while let Some(message) = queue.pop().await {
        let topic = message.topic.clone();
        match pipeline.handle(message).await {
            Ok(()) => {}
            Err(err) if err.is_fatal() => {
                error!(target: "cg.ingest", worker = index, topic, error = %err, "fatal_error");
                let _ = fatal_tx.try_send(err);
                return;
            }
            Err(err) => {
                record_message_dropped();
                error!(target: "cg.ingest", worker = index, topic, error = %err, "message_dropped");
            }
        }
    }
    debug!(target: "cg.ingest", worker = index, "worker_drained");
}

/// broker 回调侧的接收端：按 router_sn 分区入列。
struct QueueSink {
    queues: Vec<Arc<IngestQueue>>,
}

#[async_trait]
impl MessageSink for QueueSink {
    async fn deliver(&self, message: InboundMessage) -> Result<(), IngestError> {
        let index = partition(&message.topic, self.queues.len());
        match self.queues[index].push(message).await {
            Ok(PushOutcome::Queued) => Ok(()),
            Ok(PushOutcome::DroppedOldest) => {
                record_queue_dropped();
                warn!(target: "cg.ingest", queue = index, "queue_dropped_oldest");
                Ok(())
            }
            Err(_) => Err(IngestError::Closed),
        }
    }
}

/// 主题 → worker 序号。解析成功按 router_sn 散列（保序关键），
/// 否则按整个主题散列。
fn partition(topic: &str, buckets: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    match parse_topic(topic) {
        Some(parsed) => parsed.router_sn().hash(&mut hasher),
        None => topic.hash(&mut hasher),
    }
    (hasher.finish() as usize) % buckets.max(1)
}

/// 目录刷新只响应显式信号（SIGHUP），从不自动。
async fn catalog_reload_loop(catalog: Arc<CatalogCache>, pool: sqlx::PgPool) {
    #[cfg(unix)]
    {
        let mut sighup =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                Ok(sighup) => sighup,
                Err(err) => {
                    warn!(target: "cg.catalog", error = %err, "sighup_hook_failed");
                    return;
                }
            };
        while sighup.recv().await.is_some() {
            let store = PgCatalogStore::new(pool.clone());
            match catalog.load(&store).await {
                Ok(entries) => {
                    info!(target: "cg.catalog", entries, "catalog_reloaded");
                }
                Err(err) => {
                    warn!(target: "cg.catalog", error = %err, "catalog_reload_failed");
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (catalog, pool);
        std::future::pending::<()>().await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(target: "cg.main", error = %err, "sigterm_hook_failed");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[cfg(test)]
mod tests {
    use super::partition;

    #[test]
    fn partition_is_stable_per_router() {
        let a1 = partition("cg/v1/telemetry/SN/ABC", 4);
        let a2 = partition("cg/v1/decoded/SN/ABC/pcc/1", 4);
        let a3 = partition("cg/v1/decoded/SN/ABC/pcc/9", 4);
        // 同一对象的所有主题都落在同一 worker
        assert_eq!(a1, a2);
        assert_eq!(a2, a3);
        assert!(partition("cg/v1/telemetry/SN/XYZ", 1) == 0);
    }
}
