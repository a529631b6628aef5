//! Provider-polymorphic LLM client. Each run owns one client; the client
//! owns its conversation history, which is cleared between jobs.

pub mod google;
pub mod ollama;
pub mod schema;
#[cfg(test)]
pub mod testing;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::search::{AiProvider, AiProviderConfig};
use crate::tools::ToolRegistry;

pub use schema::ResponseFormat;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Bad provider configuration (missing key, unknown model at
    /// pre-flight). Fails the run.
    #[error("provider configuration error: {0}")]
    Config(String),

    /// Timeout, non-2xx status or malformed transport response. Fails the
    /// current job only.
    #[error("transport error: {0}")]
    Transport(String),
}

/// One conversation-scoped client. `generate` is a single schema-bound
/// completion; `agent` may run tool-calling rounds before answering. Both
/// return `Ok(None)` when the reply still violates the schema after one
/// regeneration attempt.
#[async_trait]
pub trait LlmClient: Send {
    fn clear_history(&mut self);

    async fn generate(
        &mut self,
        prompt: &str,
        format: &ResponseFormat,
    ) -> Result<Option<Value>, LlmError>;

    async fn agent(
        &mut self,
        prompt: &str,
        format: &ResponseFormat,
    ) -> Result<Option<Value>, LlmError>;
}

/// Build the client for the requested provider.
pub fn create_client(
    provider: AiProvider,
    config: &AiProviderConfig,
    system_prompt: String,
    tools: ToolRegistry,
    timeout: Duration,
) -> Result<Box<dyn LlmClient>, LlmError> {
    match provider {
        AiProvider::Google => Ok(Box::new(google::GoogleClient::new(
            config,
            system_prompt,
            tools,
            timeout,
        )?)),
        AiProvider::Ollama => Ok(Box::new(ollama::OllamaClient::new(
            config,
            system_prompt,
            tools,
            timeout,
        )?)),
    }
}
