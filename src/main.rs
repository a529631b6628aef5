mod config;
mod crawler;
mod enrich;
mod error;
mod llm;
mod models;
mod pipeline;
mod routes;
mod scoring;
mod tools;
mod webhook;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::pipeline::Runtime;

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("jobscout=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();

    let runtime = Arc::new(Runtime::new(&config)?);
    runtime.start();

    let app = Router::new()
        .route("/healthz", get(healthz))
        .merge(routes::router(runtime.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config)?);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(
        "Listening on {} (serving {})",
        config.listen_addr,
        config.server_host()
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runtime.shutdown();
    Ok(())
}

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    if config.cors_origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let origins = config
        .cors_origins
        .iter()
        .map(|origin| origin.trim_end_matches('/').parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received, exiting gracefully");
}
