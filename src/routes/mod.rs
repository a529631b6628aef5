use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::run::{RunCounters, RunState};
use crate::models::search::{SearchRequest, SearchResponse};
use crate::pipeline::Runtime;

pub fn router(runtime: Arc<Runtime>) -> Router {
    let api = Router::new()
        .route("/search", post(submit))
        .route("/search/{run_id}/status", get(status))
        .route("/search/{run_id}/cancel", post(cancel))
        .with_state(runtime);

    Router::new().nest("/api", api)
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: RunState,
    pub counters: RunCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/search
///
/// Validate the request, create a run and enqueue it. Returns the run id
/// without waiting for the pipeline.
pub async fn submit(
    State(runtime): State<Arc<Runtime>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let run_id = runtime.submit(request).await?;
    Ok(Json(SearchResponse {
        id: run_id.to_string(),
        status: RunState::Pending.as_str().to_string(),
    }))
}

/// GET /api/search/{run_id}/status
pub async fn status(
    State(runtime): State<Arc<Runtime>>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    let run = runtime
        .status(run_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Run {run_id} not found")))?;
    Ok(Json(StatusResponse {
        state: run.state,
        counters: run.counters,
        error: run.error,
    }))
}

/// POST /api/search/{run_id}/cancel
///
/// Stops scheduling further jobs for the run; in-flight work completes
/// and is delivered.
pub async fn cancel(
    State(runtime): State<Arc<Runtime>>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<SearchResponse>, AppError> {
    let run = runtime
        .cancel(run_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Run {run_id} not found")))?;
    Ok(Json(SearchResponse {
        id: run_id.to_string(),
        status: run.state.as_str().to_string(),
    }))
}
