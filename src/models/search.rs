use serde::{Deserialize, Serialize};

use crate::models::candidate::CandidateProfile;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpiderConfig {
    pub keywords: String,
    pub location: String,
    pub max_jobs: u32,
    /// Seniority filter: 1 intern, 2 assistant, 3 junior, 4 mid-senior,
    /// 5 director, 6 executive.
    pub seniority: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiProviderConfig {
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    Google,
    Ollama,
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiProvider::Google => write!(f, "google"),
            AiProvider::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub spider_config: SpiderConfig,
    pub ai_provider_config: AiProviderConfig,
    pub ai_provider: AiProvider,
    pub user_cv: CandidateProfile,
    #[serde(default)]
    pub webhook: Option<String>,
}

impl SearchRequest {
    /// Submit-time validation. Everything rejected here fails the request
    /// synchronously, before a run is created.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=6).contains(&self.spider_config.seniority) {
            return Err(format!(
                "seniority must be in 1..=6, got {}",
                self.spider_config.seniority
            ));
        }
        if self.spider_config.keywords.trim().is_empty() {
            return Err("keywords must not be empty".to_string());
        }
        if self.ai_provider_config.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }
        match self.ai_provider {
            AiProvider::Google => {
                if self
                    .ai_provider_config
                    .api_key
                    .as_deref()
                    .is_none_or(|k| k.trim().is_empty())
                {
                    return Err("google provider requires an api_key".to_string());
                }
            }
            AiProvider::Ollama => {
                if self
                    .ai_provider_config
                    .base_url
                    .as_deref()
                    .is_none_or(|u| u.trim().is_empty())
                {
                    return Err("ollama provider requires a base_url".to_string());
                }
            }
        }
        if let Some(webhook) = &self.webhook
            && !(webhook.starts_with("http://") || webhook.starts_with("https://"))
        {
            return Err(format!("webhook must be an http(s) URL, got {webhook}"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub id: String,
    pub status: String,
}
