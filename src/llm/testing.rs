//! Scripted LLM client for exercising the enrichment stage and the
//! pipeline without a provider.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::llm::schema::ResponseFormat;
use crate::llm::{LlmClient, LlmError};

pub struct ScriptedClient {
    pub agent_replies: VecDeque<Result<Option<Value>, LlmError>>,
    pub generate_replies: VecDeque<Result<Option<Value>, LlmError>>,
    pub history_cleared: usize,
}

impl ScriptedClient {
    /// Scripted queues that fall back to valid documents once exhausted,
    /// so multi-job runs keep succeeding.
    pub fn happy_path() -> ScriptedClient {
        ScriptedClient {
            agent_replies: VecDeque::from([Ok(Some(valid_summary()))]),
            generate_replies: VecDeque::from([Ok(Some(valid_letter()))]),
            history_cleared: 0,
        }
    }

}

pub fn valid_summary() -> Value {
    json!({
        "responsibilities": ["Design services", "Review code", "Own deployments"],
        "requirements": ["Rust", "SQL", "CI fluency"],
        "opportunity_interest": "The platform scope matches my goals.",
        "background_aligns": {
            "total": 79, "skills": 100, "education": 50, "experience": 100,
            "location": 40, "industries": 60, "languages": 45,
        },
        "summary": "Backend role with strong overlap in core skills.",
    })
}

pub fn valid_letter() -> Value {
    json!({
        "subject": "Application for Backend Engineer",
        "letter_content": "Dear hiring team, I am excited to apply.",
    })
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn clear_history(&mut self) {
        self.history_cleared += 1;
    }

    async fn generate(
        &mut self,
        _prompt: &str,
        _format: &ResponseFormat,
    ) -> Result<Option<Value>, LlmError> {
        match self.generate_replies.pop_front() {
            Some(reply) => reply,
            None => Ok(Some(valid_letter())),
        }
    }

    async fn agent(
        &mut self,
        _prompt: &str,
        _format: &ResponseFormat,
    ) -> Result<Option<Value>, LlmError> {
        match self.agent_replies.pop_front() {
            Some(reply) => reply,
            None => Ok(Some(valid_summary())),
        }
    }
}
