//! Run queue broker. Workers share the broker as their only
//! synchronization primitive; run state lives in the store.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::search::SearchRequest;

/// The payload a worker pops: the validated request plus the resolved
/// webhook target.
#[derive(Debug, Clone)]
pub struct QueuedRun {
    pub run_id: Uuid,
    pub request: SearchRequest,
    pub webhook: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("unsupported broker scheme: {0}")]
    UnsupportedScheme(String),
}

#[async_trait]
pub trait RunQueue: Send + Sync {
    async fn enqueue(&self, run: QueuedRun);

    /// Pop the next pending run, non-blocking. Workers poll.
    async fn dequeue(&self) -> Option<QueuedRun>;
}

/// In-process FIFO broker. External brokers (redis and friends) plug in
/// behind the same trait.
#[derive(Default)]
pub struct MemoryBroker {
    pending: Mutex<VecDeque<QueuedRun>>,
}

impl MemoryBroker {
    pub fn new() -> MemoryBroker {
        MemoryBroker::default()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl RunQueue for MemoryBroker {
    async fn enqueue(&self, run: QueuedRun) {
        self.pending.lock().await.push_back(run);
    }

    async fn dequeue(&self) -> Option<QueuedRun> {
        self.pending.lock().await.pop_front()
    }
}

pub fn create_broker(url: &str) -> Result<Arc<dyn RunQueue>, BrokerError> {
    match url.split_once("://").map(|(scheme, _)| scheme) {
        Some("memory") => Ok(Arc::new(MemoryBroker::new())),
        _ => Err(BrokerError::UnsupportedScheme(url.to_string())),
    }
}
