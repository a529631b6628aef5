use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Crawling,
    Enriching,
    Delivering,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Crawling => "crawling",
            RunState::Enriching => "enriching",
            RunState::Delivering => "delivering",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub total_jobs: u32,
    pub enriched: u32,
    pub enrichment_failures: u32,
    pub delivered: u32,
    pub delivery_failures: u32,
}

/// Runtime-only record of a pipeline run. Created on submit, terminal on
/// success or failure, kept for the result-retention window afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub run_id: Uuid,
    pub state: RunState,
    pub counters: RunCounters,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(run_id: Uuid) -> Run {
        Run {
            run_id,
            state: RunState::Pending,
            counters: RunCounters::default(),
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}
