//! Pipeline runtime: accepts search requests, schedules the
//! crawl -> enrich -> deliver chain on the worker pool and answers status
//! queries.

pub mod queue;
pub mod store;
pub mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use uuid::Uuid;

use crate::config::Config;
use crate::crawler::{self, Crawler, CrawlerError};
use crate::enrich::{self, EnrichError};
use crate::error::AppError;
use crate::llm::{self, LlmClient, LlmError};
use crate::models::run::{Run, RunState};
use crate::models::search::{AiProvider, AiProviderConfig, SearchRequest, SpiderConfig};
use crate::tools::ToolRegistry;
use crate::webhook::{self, WebhookEmitter};

use queue::{BrokerError, QueuedRun, RunQueue};
use store::RunStore;
use worker::{WorkerConfig, WorkerPool};

pub type CrawlerBuilder =
    Box<dyn Fn(&SpiderConfig) -> Result<Box<dyn Crawler>, CrawlerError> + Send + Sync>;
pub type ClientBuilder = Box<
    dyn Fn(AiProvider, &AiProviderConfig, String) -> Result<Box<dyn LlmClient>, LlmError>
        + Send
        + Sync,
>;

/// Everything a worker needs to execute a run. Each run builds its own
/// crawler, LLM client and webhook emitter from here; nothing mutable is
/// shared between runs.
pub struct PipelineContext {
    pub store: RunStore,
    pub queue: Arc<dyn RunQueue>,
    pub crawler_builder: CrawlerBuilder,
    pub client_builder: ClientBuilder,
    pub webhook_timeout: Duration,
    pub webhook_attempts: u32,
    pub webhook_backoff: Duration,
}

pub struct Runtime {
    ctx: Arc<PipelineContext>,
    pool: WorkerPool,
    default_webhook: String,
}

impl Runtime {
    pub fn new(config: &Config) -> Result<Runtime, BrokerError> {
        let llm_timeout = Duration::from_secs(config.llm_timeout_secs);
        let ctx = Arc::new(PipelineContext {
            store: RunStore::new(Duration::from_secs(config.result_ttl_secs)),
            queue: queue::create_broker(&config.broker_url)?,
            crawler_builder: Box::new(|_| {
                crawler::get_crawler("linkedin")
                    .ok_or_else(|| CrawlerError::Request("crawler unavailable: linkedin".into()))
            }),
            client_builder: Box::new(move |provider, provider_config, system_prompt| {
                llm::create_client(
                    provider,
                    provider_config,
                    system_prompt,
                    ToolRegistry::new(),
                    llm_timeout,
                )
            }),
            webhook_timeout: Duration::from_secs(config.webhook_timeout_secs),
            webhook_attempts: webhook::MAX_ATTEMPTS,
            webhook_backoff: webhook::BASE_DELAY,
        });

        let worker_config = WorkerConfig {
            workers: config.workers.max(1),
            ..WorkerConfig::default()
        };
        let default_webhook = format!(
            "{}/api/jobs",
            config.webhook_base_url.trim_end_matches('/')
        );
        Ok(Runtime::with_context(ctx, worker_config, default_webhook))
    }

    pub fn with_context(
        ctx: Arc<PipelineContext>,
        worker_config: WorkerConfig,
        default_webhook: String,
    ) -> Runtime {
        let pool = WorkerPool::new(ctx.clone(), worker_config);
        Runtime {
            ctx,
            pool,
            default_webhook,
        }
    }

    pub fn start(&self) {
        self.pool.start();
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Validate and enqueue. Returns the run id immediately; the chain
    /// runs on the pool.
    pub async fn submit(&self, request: SearchRequest) -> Result<Uuid, AppError> {
        request.validate().map_err(AppError::BadRequest)?;
        self.ctx.store.prune().await;

        let run_id = Uuid::new_v4();
        let webhook = request
            .webhook
            .clone()
            .unwrap_or_else(|| self.default_webhook.clone());

        tracing::info!(run_id = %run_id, provider = %request.ai_provider, "run submitted");
        self.ctx.store.create(run_id).await;
        self.ctx
            .queue
            .enqueue(QueuedRun {
                run_id,
                request,
                webhook,
            })
            .await;
        Ok(run_id)
    }

    pub async fn status(&self, run_id: Uuid) -> Option<Run> {
        self.ctx.store.prune().await;
        self.ctx.store.status(run_id).await
    }

    pub async fn cancel(&self, run_id: Uuid) -> Option<Run> {
        tracing::info!(run_id = %run_id, "cancellation requested");
        self.ctx.store.cancel(run_id).await
    }
}

/// The composite task: one crawl, then one enrichment per job in crawl
/// order, then one webhook POST per enriched job in the same order.
pub(crate) async fn execute_run(ctx: &PipelineContext, queued: QueuedRun) {
    let run_id = queued.run_id;
    let request = queued.request;
    let cancelled = ctx
        .store
        .cancel_flag(run_id)
        .await
        .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

    if cancelled.load(Ordering::SeqCst) {
        ctx.store.finish_failed(run_id, "cancelled").await;
        return;
    }

    // Crawl. Anything fatal here fails the run.
    ctx.store.set_state(run_id, RunState::Crawling).await;
    let jobs = {
        let mut crawler = match (ctx.crawler_builder)(&request.spider_config) {
            Ok(crawler) => crawler,
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, kind = "crawler", "run failed");
                ctx.store
                    .finish_failed(run_id, &format!("crawler error: {e}"))
                    .await;
                return;
            }
        };
        match crawler.crawl(&request.spider_config).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, kind = "crawler", "run failed");
                ctx.store
                    .finish_failed(run_id, &format!("crawler error: {e}"))
                    .await;
                return;
            }
        }
    };
    ctx.store.set_total_jobs(run_id, jobs.len() as u32).await;
    tracing::info!(run_id = %run_id, total_jobs = jobs.len(), "crawl complete");

    // One client per run; its history belongs to this run alone.
    let system_prompt = enrich::system_prompt(&request.user_cv);
    let mut client = match (ctx.client_builder)(
        request.ai_provider,
        &request.ai_provider_config,
        system_prompt,
    ) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(run_id = %run_id, error = %e, kind = "config", "run failed");
            ctx.store
                .finish_failed(run_id, &format!("provider error: {e}"))
                .await;
            return;
        }
    };

    ctx.store.set_state(run_id, RunState::Enriching).await;
    let mut enriched = Vec::new();
    for job in &jobs {
        if cancelled.load(Ordering::SeqCst) {
            tracing::info!(run_id = %run_id, "cancelled, no further jobs scheduled");
            break;
        }
        match enrich::enrich_job(client.as_mut(), job).await {
            Ok(enriched_job) => {
                ctx.store.add_enriched(run_id).await;
                enriched.push(enriched_job);
            }
            Err(EnrichError::Schema) => {
                tracing::warn!(run_id = %run_id, job_id = %job.job_id, kind = "schema", "job skipped");
                ctx.store.add_enrichment_failure(run_id).await;
            }
            Err(EnrichError::Llm(LlmError::Transport(detail))) => {
                tracing::warn!(run_id = %run_id, job_id = %job.job_id, kind = "llm_transport", error = %detail, "job skipped");
                ctx.store.add_enrichment_failure(run_id).await;
            }
            Err(EnrichError::Llm(LlmError::Config(detail))) => {
                tracing::error!(run_id = %run_id, error = %detail, kind = "config", "run failed");
                ctx.store
                    .finish_failed(run_id, &format!("provider error: {detail}"))
                    .await;
                return;
            }
        }
    }

    // Deliver everything already enriched, even when cancellation arrived
    // mid-run: those jobs were dispatched and their results stand.
    ctx.store.set_state(run_id, RunState::Delivering).await;
    let emitter = match WebhookEmitter::new(
        queued.webhook.clone(),
        ctx.webhook_timeout,
        ctx.webhook_attempts,
        ctx.webhook_backoff,
    ) {
        Ok(emitter) => emitter,
        Err(e) => {
            tracing::error!(run_id = %run_id, error = %e, kind = "webhook", "run failed");
            ctx.store
                .finish_failed(run_id, &format!("webhook error: {e}"))
                .await;
            return;
        }
    };
    for enriched_job in &enriched {
        match emitter.deliver(enriched_job).await {
            Ok(()) => ctx.store.add_delivered(run_id).await,
            Err(e) => {
                tracing::warn!(
                    run_id = %run_id,
                    job_id = %enriched_job.job.job_id,
                    kind = "webhook",
                    error = %e,
                    "delivery failed"
                );
                ctx.store.add_delivery_failure(run_id).await;
            }
        }
    }

    if cancelled.load(Ordering::SeqCst) {
        ctx.store.finish_failed(run_id, "cancelled").await;
    } else {
        ctx.store.finish_succeeded(run_id).await;
        if let Some(run) = ctx.store.status(run_id).await {
            tracing::info!(run_id = %run_id, counters = ?run.counters, "run finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;
    use crate::models::candidate::{CandidateLocation, CandidateProfile, LocationType};
    use crate::models::job::RawJob;
    use crate::models::search::AiProviderConfig;
    use super::queue::MemoryBroker;

    use async_trait::async_trait;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use serde_json::Value;
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    struct ScriptedCrawler {
        jobs: Vec<RawJob>,
        fail: bool,
    }

    #[async_trait]
    impl Crawler for ScriptedCrawler {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn crawl(&mut self, config: &SpiderConfig) -> Result<Vec<RawJob>, CrawlerError> {
            if self.fail {
                return Err(CrawlerError::Request("connection reset".into()));
            }
            Ok(self
                .jobs
                .iter()
                .take(config.max_jobs as usize)
                .cloned()
                .collect())
        }
    }

    /// Scripted client whose agent call takes `delay` per job, so tests
    /// can cancel mid-run deterministically.
    struct SlowClient {
        inner: ScriptedClient,
        delay: Duration,
    }

    #[async_trait]
    impl LlmClient for SlowClient {
        fn clear_history(&mut self) {
            self.inner.clear_history();
        }

        async fn generate(
            &mut self,
            prompt: &str,
            format: &crate::llm::ResponseFormat,
        ) -> Result<Option<Value>, LlmError> {
            self.inner.generate(prompt, format).await
        }

        async fn agent(
            &mut self,
            prompt: &str,
            format: &crate::llm::ResponseFormat,
        ) -> Result<Option<Value>, LlmError> {
            tokio::time::sleep(self.delay).await;
            self.inner.agent(prompt, format).await
        }
    }

    fn raw_job(id: &str) -> RawJob {
        RawJob {
            job_id: id.into(),
            job_title: format!("Engineer {id}"),
            job_url: "N/A".into(),
            job_location: "Berlin".into(),
            employer: "Acme".into(),
            employer_url: "N/A".into(),
            job_description: "<p>Build services.</p>".into(),
            seniority_level: "N/A".into(),
            employment_type: "N/A".into(),
            job_function: "N/A".into(),
            industries: "N/A".into(),
            source: "linkedin".into(),
        }
    }

    fn request(max_jobs: u32, webhook: &str) -> SearchRequest {
        SearchRequest {
            spider_config: SpiderConfig {
                keywords: "python developer".into(),
                location: "Berlin".into(),
                max_jobs,
                seniority: 3,
            },
            ai_provider_config: AiProviderConfig {
                model: "gemma3".into(),
                base_url: Some("http://localhost:11434".into()),
                api_key: None,
                temperature: None,
            },
            ai_provider: AiProvider::Ollama,
            user_cv: CandidateProfile {
                name: "Jo Doe".into(),
                total_experience_months: 48,
                skills: vec!["python".into(), "sql".into()],
                education: vec![],
                location: CandidateLocation {
                    country: "germany".into(),
                    city: "berlin".into(),
                    location_type: LocationType::Remote,
                },
                experience: vec![],
                industries: vec![],
                languages: Default::default(),
            },
            webhook: Some(webhook.into()),
        }
    }

    /// Webhook receiver recording delivered bodies; ids in `reject` always
    /// answer 500.
    async fn stub_webhook(reject: HashSet<String>) -> (String, Arc<Mutex<Vec<Value>>>) {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();

        let app = Router::new().route(
            "/api/jobs",
            post(move |body: axum::Json<Value>| {
                let sink = sink.clone();
                let reject = reject.clone();
                async move {
                    let job_id = body.0["job_id"].as_str().unwrap_or_default().to_string();
                    if reject.contains(&job_id) {
                        return StatusCode::INTERNAL_SERVER_ERROR;
                    }
                    sink.lock().await.push(body.0);
                    StatusCode::OK
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/api/jobs"), delivered)
    }

    fn runtime_with(
        jobs: Vec<RawJob>,
        crawler_fails: bool,
        client_builder: ClientBuilder,
    ) -> Runtime {
        let ctx = Arc::new(PipelineContext {
            store: RunStore::new(Duration::from_secs(3600)),
            queue: Arc::new(MemoryBroker::new()),
            crawler_builder: Box::new(move |_| {
                Ok(Box::new(ScriptedCrawler {
                    jobs: jobs.clone(),
                    fail: crawler_fails,
                }) as Box<dyn Crawler>)
            }),
            client_builder,
            webhook_timeout: Duration::from_secs(2),
            webhook_attempts: 3,
            webhook_backoff: Duration::from_millis(5),
        });
        let worker_config = WorkerConfig {
            workers: 1,
            poll_interval: Duration::from_millis(10),
            soft_time_limit: Duration::from_secs(60),
            hard_time_limit: Duration::from_secs(120),
        };
        Runtime::with_context(ctx, worker_config, "http://localhost:9999/api/jobs".into())
    }

    fn scripted_clients() -> ClientBuilder {
        Box::new(|_, _, _| Ok(Box::new(ScriptedClient::happy_path()) as Box<dyn LlmClient>))
    }

    async fn wait_terminal(runtime: &Runtime, run_id: Uuid) -> Run {
        for _ in 0..500 {
            if let Some(run) = runtime.status(run_id).await
                && run.state.is_terminal()
            {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} did not reach a terminal state");
    }

    #[tokio::test]
    async fn happy_path_single_job() {
        let (webhook, delivered) = stub_webhook(HashSet::new()).await;
        let runtime = runtime_with(vec![raw_job("1")], false, scripted_clients());
        runtime.start();

        let run_id = runtime.submit(request(1, &webhook)).await.unwrap();
        let run = wait_terminal(&runtime, run_id).await;
        runtime.shutdown();

        assert_eq!(run.state, RunState::Succeeded);
        assert_eq!(run.counters.total_jobs, 1);
        assert_eq!(run.counters.enriched, 1);
        assert_eq!(run.counters.delivered, 1);
        assert_eq!(run.counters.delivery_failures, 0);

        let bodies = delivered.lock().await;
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0]["job_summary"]["background_aligns"]["total"].is_u64());
        assert!(!bodies[0]["cover_letter"]["subject"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_max_jobs_succeeds_without_deliveries() {
        let (webhook, delivered) = stub_webhook(HashSet::new()).await;
        let runtime = runtime_with(vec![raw_job("1"), raw_job("2")], false, scripted_clients());
        runtime.start();

        let run_id = runtime.submit(request(0, &webhook)).await.unwrap();
        let run = wait_terminal(&runtime, run_id).await;
        runtime.shutdown();

        assert_eq!(run.state, RunState::Succeeded);
        assert_eq!(run.counters.total_jobs, 0);
        assert!(delivered.lock().await.is_empty());
    }

    #[tokio::test]
    async fn crawler_failure_fails_the_run() {
        let (webhook, _) = stub_webhook(HashSet::new()).await;
        let runtime = runtime_with(vec![], true, scripted_clients());
        runtime.start();

        let run_id = runtime.submit(request(5, &webhook)).await.unwrap();
        let run = wait_terminal(&runtime, run_id).await;
        runtime.shutdown();

        assert_eq!(run.state, RunState::Failed);
        assert!(run.error.unwrap().contains("crawler error"));
    }

    #[tokio::test]
    async fn schema_failure_skips_the_job_and_continues() {
        let (webhook, delivered) = stub_webhook(HashSet::new()).await;
        let client_builder: ClientBuilder = Box::new(|_, _, _| {
            let mut client = ScriptedClient::happy_path();
            // First job's summary never validates; the rest fall back to
            // valid documents.
            client.agent_replies.clear();
            client.agent_replies.push_back(Ok(None));
            Ok(Box::new(client) as Box<dyn LlmClient>)
        });
        let runtime = runtime_with(vec![raw_job("1"), raw_job("2")], false, client_builder);
        runtime.start();

        let run_id = runtime.submit(request(2, &webhook)).await.unwrap();
        let run = wait_terminal(&runtime, run_id).await;
        runtime.shutdown();

        assert_eq!(run.state, RunState::Succeeded);
        assert_eq!(run.counters.total_jobs, 2);
        assert_eq!(run.counters.enriched, 1);
        assert_eq!(run.counters.enrichment_failures, 1);
        assert_eq!(run.counters.delivered, 1);

        let bodies = delivered.lock().await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["job_id"], "2");
    }

    #[tokio::test]
    async fn webhook_500_counts_one_failure_without_poisoning_the_run() {
        let (webhook, delivered) = stub_webhook(HashSet::from(["2".to_string()])).await;
        let runtime = runtime_with(
            vec![raw_job("1"), raw_job("2"), raw_job("3")],
            false,
            scripted_clients(),
        );
        runtime.start();

        let run_id = runtime.submit(request(3, &webhook)).await.unwrap();
        let run = wait_terminal(&runtime, run_id).await;
        runtime.shutdown();

        assert_eq!(run.state, RunState::Succeeded);
        assert_eq!(run.counters.total_jobs, 3);
        assert_eq!(run.counters.enriched, 3);
        assert_eq!(run.counters.delivered, 2);
        assert_eq!(run.counters.delivery_failures, 1);

        let ids: Vec<String> = delivered
            .lock()
            .await
            .iter()
            .map(|b| b["job_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn provider_config_error_fails_the_run() {
        let (webhook, _) = stub_webhook(HashSet::new()).await;
        let client_builder: ClientBuilder =
            Box::new(|_, _, _| Err(LlmError::Config("model gemma3 not found".into())));
        let runtime = runtime_with(vec![raw_job("1")], false, client_builder);
        runtime.start();

        let run_id = runtime.submit(request(1, &webhook)).await.unwrap();
        let run = wait_terminal(&runtime, run_id).await;
        runtime.shutdown();

        assert_eq!(run.state, RunState::Failed);
        assert!(run.error.unwrap().contains("provider error"));
    }

    #[tokio::test]
    async fn cancelled_run_delivers_finished_jobs_then_fails() {
        let (webhook, _) = stub_webhook(HashSet::new()).await;
        let client_builder: ClientBuilder = Box::new(|_, _, _| {
            Ok(Box::new(SlowClient {
                inner: ScriptedClient::happy_path(),
                delay: Duration::from_millis(100),
            }) as Box<dyn LlmClient>)
        });
        let jobs = (1..=5).map(|i| raw_job(&i.to_string())).collect();
        let runtime = runtime_with(jobs, false, client_builder);
        runtime.start();

        let run_id = runtime.submit(request(5, &webhook)).await.unwrap();

        // Cancel once the first job is through enrichment.
        for _ in 0..500 {
            if let Some(run) = runtime.status(run_id).await
                && run.counters.enriched >= 1
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        runtime.cancel(run_id).await.unwrap();

        let run = wait_terminal(&runtime, run_id).await;
        runtime.shutdown();

        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.error.as_deref(), Some("cancelled"));
        assert!(run.counters.delivered >= 1);
        assert_eq!(run.counters.delivered, run.counters.enriched);
    }

    #[tokio::test]
    async fn submit_rejects_invalid_requests_synchronously() {
        let runtime = runtime_with(vec![], false, scripted_clients());
        let mut bad = request(1, "http://localhost:9000/api/jobs");
        bad.spider_config.seniority = 9;
        let err = runtime.submit(bad).await.err().unwrap();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn hard_time_limit_abandons_the_run() {
        let (webhook, _) = stub_webhook(HashSet::new()).await;
        let client_builder: ClientBuilder = Box::new(|_, _, _| {
            Ok(Box::new(SlowClient {
                inner: ScriptedClient::happy_path(),
                delay: Duration::from_secs(30),
            }) as Box<dyn LlmClient>)
        });
        let ctx = Arc::new(PipelineContext {
            store: RunStore::new(Duration::from_secs(3600)),
            queue: Arc::new(MemoryBroker::new()),
            crawler_builder: Box::new(|_| {
                Ok(Box::new(ScriptedCrawler {
                    jobs: vec![raw_job("1")],
                    fail: false,
                }) as Box<dyn Crawler>)
            }),
            client_builder,
            webhook_timeout: Duration::from_secs(2),
            webhook_attempts: 1,
            webhook_backoff: Duration::from_millis(5),
        });
        let runtime = Runtime::with_context(
            ctx,
            WorkerConfig {
                workers: 1,
                poll_interval: Duration::from_millis(10),
                soft_time_limit: Duration::from_millis(50),
                hard_time_limit: Duration::from_millis(150),
            },
            webhook,
        );
        runtime.start();

        let run_id = runtime
            .submit(request(1, "http://localhost:9998/api/jobs"))
            .await
            .unwrap();
        let run = wait_terminal(&runtime, run_id).await;
        runtime.shutdown();

        assert_eq!(run.state, RunState::Failed);
        assert!(run.error.unwrap().contains("time limit"));
    }
}
