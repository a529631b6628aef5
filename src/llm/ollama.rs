//! Ollama client. The `/api/generate` endpoint is single-shot with a
//! `format` schema; there is no native tool-calling, so agent mode is
//! emulated by appending the tool manifest to the system instructions.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::llm::schema::ResponseFormat;
use crate::llm::{LlmClient, LlmError};
use crate::models::search::AiProviderConfig;
use crate::tools::ToolRegistry;

const REGENERATION_PROMPT: &str =
    "Regenerate the response in JSON format, strictly follow the schema";

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    system_prompt: String,
    tools: ToolRegistry,
    history: Vec<(&'static str, String)>,
    model_checked: bool,
}

impl OllamaClient {
    pub fn new(
        config: &AiProviderConfig,
        system_prompt: String,
        tools: ToolRegistry,
        timeout: Duration,
    ) -> Result<OllamaClient, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| LlmError::Config("ollama provider requires a base_url".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(OllamaClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            system_prompt,
            tools,
            history: Vec::new(),
            model_checked: false,
        })
    }

    /// List the server's models once and fail when the configured model is
    /// not installed.
    async fn ensure_model(&mut self) -> Result<(), LlmError> {
        if self.model_checked {
            return Ok(());
        }

        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| LlmError::Transport(format!("ollama tags request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LlmError::Transport(format!(
                "ollama tags returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("malformed tags response: {e}")))?;

        let known = body
            .get("models")
            .and_then(Value::as_array)
            .is_some_and(|models| {
                models.iter().any(|m| {
                    m.get("name")
                        .or_else(|| m.get("model"))
                        .and_then(Value::as_str)
                        .is_some_and(|name| name == self.model)
                })
            });
        if !known {
            return Err(LlmError::Config(format!("model {} not found", self.model)));
        }

        self.model_checked = true;
        Ok(())
    }

    async fn generate_with_system(
        &mut self,
        system: &str,
        prompt: &str,
        format: &ResponseFormat,
    ) -> Result<Option<Value>, LlmError> {
        self.ensure_model().await?;

        let mut body = json!({
            "model": self.model,
            "system": system,
            "prompt": prompt,
            "format": format.schema,
            "stream": false,
        });
        if let Some(temperature) = self.temperature {
            body["options"] = json!({ "temperature": temperature });
        }

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(format!("ollama generate failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport(format!(
                "ollama returned {status}: {detail}"
            )));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("malformed generate response: {e}")))?;
        let text = reply
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::Transport("generate response carries no text".to_string()))?
            .to_string();

        self.history.push(("user", prompt.to_string()));
        self.history.push(("assistant", text.clone()));

        match format.validate(&text) {
            Some(value) => Ok(Some(value)),
            None => {
                tracing::warn!(format = format.name, "response failed schema validation");
                Ok(None)
            }
        }
    }

    fn agent_system_prompt(&self) -> String {
        format!(
            "{}\n\nYou cannot call functions directly. The following tool \
             definitions describe the exact scoring rules to apply:\n{}",
            self.system_prompt,
            self.tools.manifest()
        )
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn clear_history(&mut self) {
        self.history.clear();
    }

    async fn generate(
        &mut self,
        prompt: &str,
        format: &ResponseFormat,
    ) -> Result<Option<Value>, LlmError> {
        let system = self.system_prompt.clone();
        self.generate_with_system(&system, prompt, format).await
    }

    async fn agent(
        &mut self,
        prompt: &str,
        format: &ResponseFormat,
    ) -> Result<Option<Value>, LlmError> {
        let system = self.agent_system_prompt();
        if let Some(value) = self.generate_with_system(&system, prompt, format).await? {
            return Ok(Some(value));
        }
        tracing::warn!(format = format.name, "agent reply failed schema, regenerating");
        self.generate_with_system(&system, REGENERATION_PROMPT, format)
            .await
    }
}
