//! In-memory registry of runs: state, counters and cancellation flags,
//! kept for the result-retention window after a run finishes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::run::{Run, RunState};

struct RunEntry {
    run: Run,
    cancelled: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct RunStore {
    inner: Arc<RwLock<HashMap<Uuid, RunEntry>>>,
    retention: TimeDelta,
}

impl RunStore {
    pub fn new(retention: Duration) -> RunStore {
        RunStore {
            inner: Arc::new(RwLock::new(HashMap::new())),
            retention: TimeDelta::seconds(retention.as_secs() as i64),
        }
    }

    pub async fn create(&self, run_id: Uuid) {
        self.inner.write().await.insert(
            run_id,
            RunEntry {
                run: Run::new(run_id),
                cancelled: Arc::new(AtomicBool::new(false)),
            },
        );
    }

    pub async fn status(&self, run_id: Uuid) -> Option<Run> {
        self.inner.read().await.get(&run_id).map(|e| e.run.clone())
    }

    pub async fn cancel_flag(&self, run_id: Uuid) -> Option<Arc<AtomicBool>> {
        self.inner
            .read()
            .await
            .get(&run_id)
            .map(|e| e.cancelled.clone())
    }

    /// Request cancellation. The executor stops scheduling new jobs and
    /// marks the run failed; a run that already finished is left as-is.
    pub async fn cancel(&self, run_id: Uuid) -> Option<Run> {
        let mut inner = self.inner.write().await;
        let entry = inner.get_mut(&run_id)?;
        if !entry.run.state.is_terminal() {
            entry.cancelled.store(true, Ordering::SeqCst);
        }
        Some(entry.run.clone())
    }

    pub async fn set_state(&self, run_id: Uuid, state: RunState) {
        self.update(run_id, |run| run.state = state).await;
    }

    pub async fn set_total_jobs(&self, run_id: Uuid, total: u32) {
        self.update(run_id, |run| run.counters.total_jobs = total)
            .await;
    }

    pub async fn add_enriched(&self, run_id: Uuid) {
        self.update(run_id, |run| run.counters.enriched += 1).await;
    }

    pub async fn add_enrichment_failure(&self, run_id: Uuid) {
        self.update(run_id, |run| run.counters.enrichment_failures += 1)
            .await;
    }

    pub async fn add_delivered(&self, run_id: Uuid) {
        self.update(run_id, |run| run.counters.delivered += 1).await;
    }

    pub async fn add_delivery_failure(&self, run_id: Uuid) {
        self.update(run_id, |run| run.counters.delivery_failures += 1)
            .await;
    }

    pub async fn finish_succeeded(&self, run_id: Uuid) {
        self.update(run_id, |run| {
            run.state = RunState::Succeeded;
            run.finished_at = Some(Utc::now());
        })
        .await;
    }

    pub async fn finish_failed(&self, run_id: Uuid, error: &str) {
        self.update(run_id, |run| {
            run.state = RunState::Failed;
            run.error = Some(error.to_string());
            run.finished_at = Some(Utc::now());
        })
        .await;
    }

    /// Drop terminal runs past the retention window.
    pub async fn prune(&self) {
        let cutoff = Utc::now() - self.retention;
        self.inner.write().await.retain(|_, entry| {
            entry
                .run
                .finished_at
                .is_none_or(|finished| finished > cutoff)
        });
    }

    async fn update(&self, run_id: Uuid, apply: impl FnOnce(&mut Run)) {
        if let Some(entry) = self.inner.write().await.get_mut(&run_id) {
            apply(&mut entry.run);
        }
    }
}
