//! 有界入列队列。
//!
//! 每个 ingest worker 独占一条队列，broker 回调按 router_sn 哈希
//! 选队列，保证同一对象的消息顺序。队列满时默认阻塞回调（至少一次
//! 语义）；显式配置 drop_oldest 时挤掉最老的一条并向调用方报告。

use crate::InboundMessage;
use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};

/// push 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// 为了入列挤掉了一条最老消息（仅 drop_oldest 模式）。
    DroppedOldest,
}

#[derive(Debug)]
struct QueueInner {
    items: VecDeque<InboundMessage>,
    closed: bool,
}

/// 有界 FIFO，支持关闭后排空。
pub struct IngestQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
    drop_oldest: bool,
    not_empty: Notify,
    not_full: Notify,
}

impl IngestQueue {
    pub fn new(capacity: usize, drop_oldest: bool) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                closed: false,
            }),
            capacity: capacity.max(1),
            drop_oldest,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// 入列。队列关闭返回 Err(message)；满且非 drop_oldest 时挂起等待。
    pub async fn push(&self, message: InboundMessage) -> Result<PushOutcome, InboundMessage> {
        loop {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return Err(message);
            }
            if inner.items.len() < self.capacity {
                inner.items.push_back(message);
                self.not_empty.notify_one();
                return Ok(PushOutcome::Queued);
            }
            if self.drop_oldest {
                inner.items.pop_front();
                inner.items.push_back(message);
                self.not_empty.notify_one();
                return Ok(PushOutcome::DroppedOldest);
            }
            // notified() 要在释放锁之前创建，避免错过唤醒
            let not_full = self.not_full.notified();
            drop(inner);
            not_full.await;
        }
    }

    /// 出列。队列空且已关闭返回 None。
    pub async fn pop(&self) -> Option<InboundMessage> {
        loop {
            let mut inner = self.inner.lock().await;
            if let Some(message) = inner.items.pop_front() {
                self.not_full.notify_one();
                return Some(message);
            }
            if inner.closed {
                return None;
            }
            let not_empty = self.not_empty.notified();
            drop(inner);
            not_empty.await;
        }
    }

    /// 关闭队列：不再接受新消息，已入列的仍可被 pop 排空。
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
