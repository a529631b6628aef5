//! Worker pool: poll-loop workers consuming runs from the broker, with
//! per-run time limits and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::pipeline::queue::QueuedRun;
use crate::pipeline::{PipelineContext, execute_run};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    /// Past this, the run is logged as overdue but keeps going.
    pub soft_time_limit: Duration,
    /// Past this, the run is abandoned and marked failed.
    pub hard_time_limit: Duration,
}

impl Default for WorkerConfig {
    fn default() -> WorkerConfig {
        WorkerConfig {
            workers: 2,
            poll_interval: Duration::from_millis(500),
            soft_time_limit: Duration::from_secs(25 * 60),
            hard_time_limit: Duration::from_secs(30 * 60),
        }
    }
}

pub struct WorkerPool {
    ctx: Arc<PipelineContext>,
    config: WorkerConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl WorkerPool {
    pub fn new(ctx: Arc<PipelineContext>, config: WorkerConfig) -> WorkerPool {
        let (shutdown_tx, _) = broadcast::channel(1);
        WorkerPool {
            ctx,
            config,
            shutdown_tx,
        }
    }

    /// Spawn the workers. Each holds at most the run it is executing; the
    /// broker is the only hand-off point.
    pub fn start(&self) {
        for i in 0..self.config.workers {
            let worker_id = format!("worker-{i}");
            let ctx = self.ctx.clone();
            let config = self.config.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(worker_loop(worker_id, ctx, config, shutdown_rx));
        }
        tracing::info!(workers = self.config.workers, "worker pool started");
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn worker_loop(
    worker_id: String,
    ctx: Arc<PipelineContext>,
    config: WorkerConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tracing::debug!(worker_id = %worker_id, "worker started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                break;
            }
            _ = async {
                if let Some(queued) = ctx.queue.dequeue().await {
                    tracing::info!(worker_id = %worker_id, run_id = %queued.run_id, "claimed run");
                    run_with_limits(&ctx, &config, queued).await;
                } else {
                    tokio::time::sleep(config.poll_interval).await;
                }
            } => {}
        }
    }
    tracing::debug!(worker_id = %worker_id, "worker stopped");
}

async fn run_with_limits(ctx: &Arc<PipelineContext>, config: &WorkerConfig, queued: QueuedRun) {
    let run_id = queued.run_id;
    let fut = execute_run(ctx, queued);
    tokio::pin!(fut);
    let soft = tokio::time::sleep(config.soft_time_limit);
    tokio::pin!(soft);
    let hard = tokio::time::sleep(config.hard_time_limit);
    tokio::pin!(hard);

    let mut warned = false;
    loop {
        tokio::select! {
            _ = &mut fut => break,
            _ = &mut soft, if !warned => {
                warned = true;
                tracing::warn!(run_id = %run_id, "run exceeded the soft time limit");
            }
            _ = &mut hard => {
                tracing::error!(run_id = %run_id, "run exceeded the hard time limit, abandoned");
                ctx.store.finish_failed(run_id, "run time limit exceeded").await;
                break;
            }
        }
    }
}
