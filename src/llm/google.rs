//! Gemini REST client with server-side function-calling.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::llm::schema::ResponseFormat;
use crate::llm::{LlmClient, LlmError};
use crate::models::search::AiProviderConfig;
use crate::tools::ToolRegistry;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Structured tool errors tolerated within one agent call before the call
/// is abandoned as a transport failure.
const MAX_TOOL_ERRORS: usize = 3;
/// Tool-calling round trips allowed within one agent call.
const MAX_AGENT_ROUNDS: usize = 8;

const REGENERATION_PROMPT: &str =
    "Regenerate the response in JSON format, strictly follow the schema";

/// Conversation roles as kept in history. `FunctionResponse` turns carry
/// tool results and serialize to the wire role `user` with
/// `functionResponse` parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    User,
    Model,
    FunctionResponse,
}

impl Role {
    fn wire(self) -> &'static str {
        match self {
            Role::User | Role::FunctionResponse => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Debug, Clone)]
struct Turn {
    role: Role,
    parts: Vec<Value>,
}

pub struct GoogleClient {
    http: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    temperature: Option<f32>,
    system_prompt: String,
    tools: ToolRegistry,
    history: Vec<Turn>,
}

impl GoogleClient {
    pub fn new(
        config: &AiProviderConfig,
        system_prompt: String,
        tools: ToolRegistry,
        timeout: Duration,
    ) -> Result<GoogleClient, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::Config("google provider requires an api_key".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(GoogleClient {
            http,
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            temperature: config.temperature,
            system_prompt,
            tools,
            history: Vec::new(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }

    fn push_text(&mut self, role: Role, text: &str) {
        let mut parts: Vec<Value> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| json!({ "text": l }))
            .collect();
        if parts.is_empty() {
            parts.push(json!({ "text": text }));
        }
        self.history.push(Turn { role, parts });
    }

    fn contents(&self) -> Value {
        Value::Array(
            self.history
                .iter()
                .map(|t| json!({ "role": t.role.wire(), "parts": t.parts }))
                .collect(),
        )
    }

    /// System instructions and the tool manifest are rebuilt per request;
    /// they never enter history.
    fn request_body(&self, generation_config: Value, with_tools: bool) -> Value {
        let mut body = json!({
            "contents": self.contents(),
            "systemInstruction": { "parts": [{ "text": self.system_prompt }] },
            "generationConfig": generation_config,
        });
        if with_tools {
            body["tools"] = json!([{ "functionDeclarations": self.function_declarations() }]);
        }
        body
    }

    fn function_declarations(&self) -> Value {
        Value::Array(
            self.tools
                .declarations()
                .iter()
                .map(|d| {
                    json!({
                        "name": d.name,
                        "description": d.description,
                        "parameters": d.parameters,
                        "response": d.response,
                    })
                })
                .collect(),
        )
    }

    fn generation_config(&self, schema: Option<&Value>) -> Value {
        let mut config = serde_json::Map::new();
        if let Some(schema) = schema {
            config.insert(
                "responseMimeType".to_string(),
                json!("application/json"),
            );
            config.insert("responseJsonSchema".to_string(), schema.clone());
        }
        if let Some(temperature) = self.temperature {
            config.insert("temperature".to_string(), json!(temperature));
        }
        Value::Object(config)
    }

    async fn call(&self, body: &Value) -> Result<Value, LlmError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(format!("gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport(format!(
                "gemini returned {status}: {detail}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("malformed gemini response: {e}")))
    }

    async fn generate_impl(
        &mut self,
        prompt: &str,
        format: &ResponseFormat,
    ) -> Result<Option<Value>, LlmError> {
        self.push_text(Role::User, prompt);

        let body = self.request_body(self.generation_config(Some(&format.schema)), false);
        let response = self.call(&body).await?;
        let (_, parts) = candidate_content(&response)?;
        let text = text_of(&parts);
        self.push_text(Role::Model, &text);

        match format.validate(&text) {
            Some(value) => Ok(Some(value)),
            None => {
                tracing::warn!(format = format.name, "response failed schema validation");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl LlmClient for GoogleClient {
    fn clear_history(&mut self) {
        self.history.clear();
    }

    async fn generate(
        &mut self,
        prompt: &str,
        format: &ResponseFormat,
    ) -> Result<Option<Value>, LlmError> {
        self.generate_impl(prompt, format).await
    }

    async fn agent(
        &mut self,
        prompt: &str,
        format: &ResponseFormat,
    ) -> Result<Option<Value>, LlmError> {
        self.push_text(Role::User, prompt);

        let mut tool_errors = 0usize;

        for _ in 0..MAX_AGENT_ROUNDS {
            let body = self.request_body(self.generation_config(None), true);
            let response = self.call(&body).await?;
            let (_, parts) = candidate_content(&response)?;

            let calls = function_calls(&parts);
            if calls.is_empty() {
                let text = text_of(&parts);
                self.push_text(Role::Model, &text);

                if let Some(value) = format.validate(&text) {
                    return Ok(Some(value));
                }
                tracing::warn!(format = format.name, "agent reply failed schema, regenerating");
                return self.generate_impl(REGENERATION_PROMPT, format).await;
            }

            tracing::info!(
                tools = ?calls.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
                "model requested tools"
            );
            self.history.push(Turn {
                role: Role::Model,
                parts: parts.clone(),
            });

            // Dispatch sequentially, responses in request order.
            let mut response_parts = Vec::with_capacity(calls.len());
            for (name, args) in calls {
                let payload = match self.tools.dispatch(&name, &args) {
                    Ok(result) => json!({ "result": result }),
                    Err(err) => {
                        tool_errors += 1;
                        tracing::warn!(tool = %name, error = %err, "tool call rejected");
                        if tool_errors > MAX_TOOL_ERRORS {
                            return Err(LlmError::Transport(format!(
                                "giving up after {tool_errors} rejected tool calls"
                            )));
                        }
                        err.payload()
                    }
                };
                response_parts.push(json!({
                    "functionResponse": { "name": name, "response": payload }
                }));
            }
            self.history.push(Turn {
                role: Role::FunctionResponse,
                parts: response_parts,
            });
        }

        Err(LlmError::Transport(format!(
            "agent exceeded {MAX_AGENT_ROUNDS} tool-calling rounds"
        )))
    }
}

fn candidate_content(response: &Value) -> Result<(String, Vec<Value>), LlmError> {
    let content = response
        .pointer("/candidates/0/content")
        .ok_or_else(|| LlmError::Transport("response carries no candidates".to_string()))?;
    let role = content
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or("model")
        .to_string();
    let parts = content
        .get("parts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    Ok((role, parts))
}

fn function_calls(parts: &[Value]) -> Vec<(String, Value)> {
    parts
        .iter()
        .filter_map(|part| part.get("functionCall"))
        .filter_map(|call| {
            let name = call.get("name")?.as_str()?.to_string();
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            Some((name, args))
        })
        .collect()
}

fn text_of(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::schema;

    use axum::Router;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn client() -> GoogleClient {
        let config = AiProviderConfig {
            model: "gemini-2.0-flash".into(),
            base_url: None,
            api_key: Some("test-key".into()),
            temperature: Some(0.2),
        };
        GoogleClient::new(
            &config,
            "You are a job search assistant.".into(),
            ToolRegistry::new(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn missing_api_key_fails_construction() {
        let config = AiProviderConfig {
            model: "gemini-2.0-flash".into(),
            base_url: None,
            api_key: None,
            temperature: None,
        };
        let err = GoogleClient::new(
            &config,
            String::new(),
            ToolRegistry::new(),
            Duration::from_secs(5),
        )
        .err()
        .unwrap();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn function_response_turns_use_wire_role_user() {
        assert_eq!(Role::FunctionResponse.wire(), "user");
        assert_eq!(Role::Model.wire(), "model");
    }

    #[test]
    fn request_body_carries_schema_and_system_instruction() {
        let mut client = client();
        client.push_text(Role::User, "hello");
        let format = schema::cover_letter();
        let body = client.request_body(client.generation_config(Some(&format.schema)), false);

        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(body["generationConfig"]["temperature"], 0.2);
        assert!(body["generationConfig"]["responseJsonSchema"].is_object());
        assert!(body.get("tools").is_none());
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are a job search assistant."
        );
    }

    #[test]
    fn agent_body_advertises_all_declared_tools() {
        let client = client();
        let body = client.request_body(client.generation_config(None), true);
        let declarations = body["tools"][0]["functionDeclarations"].as_array().unwrap();
        assert_eq!(declarations.len(), client.tools.declarations().len());
        assert!(
            declarations
                .iter()
                .any(|d| d["name"] == "calculate_overall_score")
        );
    }

    #[test]
    fn push_text_splits_lines_and_skips_blanks() {
        let mut client = client();
        client.push_text(Role::User, "first\n\n  second  \n");
        assert_eq!(client.history.len(), 1);
        let parts = &client.history[0].parts;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["text"], "first");
        assert_eq!(parts[1]["text"], "second");
    }

    #[test]
    fn function_calls_parse_from_candidate_parts() {
        let response = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "functionCall": { "name": "calculate_skills_score",
                                            "args": { "candidate_skills": [], "job_skills": [] } } },
                        { "functionCall": { "name": "calculate_overall_score" } },
                    ],
                }
            }]
        });
        let (role, parts) = candidate_content(&response).unwrap();
        assert_eq!(role, "model");
        let calls = function_calls(&parts);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "calculate_skills_score");
        assert_eq!(calls[1].1, json!({}));
    }

    #[test]
    fn text_of_concatenates_text_parts() {
        let parts = vec![json!({ "text": "{\"a\":" }), json!({ "text": "1}" })];
        assert_eq!(text_of(&parts), "{\"a\":\n1}");
    }

    #[test]
    fn missing_candidates_is_a_transport_error() {
        assert!(candidate_content(&json!({})).is_err());
    }

    /// Gemini stub answering queued replies and recording request bodies.
    async fn stub_gemini(replies: Vec<Value>) -> (String, Arc<Mutex<Vec<Value>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let sink = requests.clone();
        let queue = Arc::new(Mutex::new(VecDeque::from(replies)));

        let app = Router::new().fallback(move |body: axum::Json<Value>| {
            let sink = sink.clone();
            let queue = queue.clone();
            async move {
                sink.lock().await.push(body.0);
                let reply = queue.lock().await.pop_front().unwrap_or_else(|| json!({}));
                axum::Json(reply)
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), requests)
    }

    fn valid_summary_text() -> String {
        json!({
            "responsibilities": ["Design services", "Review code"],
            "requirements": ["Rust", "SQL"],
            "opportunity_interest": "Strong platform scope.",
            "background_aligns": {
                "total": 79, "skills": 100, "education": 50, "experience": 100,
                "location": 40, "industries": 60, "languages": 45,
            },
            "summary": "Backend role with strong overlap.",
        })
        .to_string()
    }

    #[tokio::test]
    async fn agent_loop_dispatches_tools_and_returns_errors_to_the_model() {
        // Round 1: one valid call plus one with an out-of-range score.
        let round1 = json!({ "candidates": [{ "content": { "role": "model", "parts": [
            { "functionCall": { "name": "calculate_skills_score",
                "args": { "candidate_skills": ["python"], "job_skills": ["python"] } } },
            { "functionCall": { "name": "calculate_overall_score",
                "args": { "scores": { "skills": 150, "education": 0, "experience": 0,
                                      "location": 0, "industries": 0, "languages": 0 } } } },
        ] } }] });
        let round2 = json!({ "candidates": [{ "content": { "role": "model", "parts": [
            { "text": valid_summary_text() },
        ] } }] });

        let (base, requests) = stub_gemini(vec![round1, round2]).await;
        let config = AiProviderConfig {
            model: "gemini-2.0-flash".into(),
            base_url: Some(base),
            api_key: Some("test-key".into()),
            temperature: None,
        };
        let mut client = GoogleClient::new(
            &config,
            "system".into(),
            ToolRegistry::new(),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = client
            .agent("summarize this job", &schema::job_summary())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["background_aligns"]["total"], 79);

        let requests = requests.lock().await;
        assert_eq!(requests.len(), 2);

        // The second request ends with the combined tool-response turn, in
        // request order: a result wrapper then a structured error.
        let contents = requests[1]["contents"].as_array().unwrap();
        let last = contents.last().unwrap();
        assert_eq!(last["role"], "user");
        let parts = last["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[0]["functionResponse"]["response"]["result"],
            json!(100)
        );
        assert_eq!(
            parts[1]["functionResponse"]["response"]["error"]["kind"],
            "out_of_range"
        );
    }

    #[tokio::test]
    async fn agent_falls_back_to_regeneration_on_schema_violation() {
        let bad = json!({ "candidates": [{ "content": { "role": "model", "parts": [
            { "text": "{\"background_aligns\": 4}" },
        ] } }] });
        let good = json!({ "candidates": [{ "content": { "role": "model", "parts": [
            { "text": valid_summary_text() },
        ] } }] });

        let (base, requests) = stub_gemini(vec![bad, good]).await;
        let config = AiProviderConfig {
            model: "gemini-2.0-flash".into(),
            base_url: Some(base),
            api_key: Some("test-key".into()),
            temperature: None,
        };
        let mut client = GoogleClient::new(
            &config,
            "system".into(),
            ToolRegistry::new(),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = client
            .agent("summarize this job", &schema::job_summary())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["background_aligns"]["total"], 79);

        let requests = requests.lock().await;
        assert_eq!(requests.len(), 2);
        // The regeneration call is schema-constrained.
        assert_eq!(
            requests[1]["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }
}
