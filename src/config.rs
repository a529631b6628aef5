use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "jobscout", about = "AI-assisted job search pipeline")]
pub struct Config {
    /// Listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Deployment environment, affects the URL scheme of server_host
    #[arg(long, env = "ENVIRONMENT", default_value = "local", value_parser = ["local", "production"])]
    pub environment: String,

    /// Public domain of this deployment
    #[arg(long, env = "DOMAIN", default_value = "localhost")]
    pub domain: String,

    /// Allowed CORS origins, comma-separated
    #[arg(long, env = "BACKEND_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Run queue broker URL
    #[arg(long, env = "BROKER_URL", default_value = "memory://")]
    pub broker_url: String,

    /// Worker pool size
    #[arg(long, env = "WORKERS", default_value = "2")]
    pub workers: usize,

    /// How long finished run results stay queryable, in seconds
    #[arg(long, env = "RESULT_TTL_SECS", default_value = "3600")]
    pub result_ttl_secs: u64,

    /// Default callback base used when a search request omits its webhook
    #[arg(long, env = "WEBHOOK_BASE_URL", default_value = "http://localhost:8080")]
    pub webhook_base_url: String,

    /// Transport timeout for a single LLM provider call, in seconds
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value = "120")]
    pub llm_timeout_secs: u64,

    /// Transport timeout for a single webhook POST, in seconds
    #[arg(long, env = "WEBHOOK_TIMEOUT_SECS", default_value = "30")]
    pub webhook_timeout_secs: u64,
}

impl Config {
    /// Base URL of this deployment. Anything other than local development
    /// is served over HTTPS.
    pub fn server_host(&self) -> String {
        if self.environment == "local" {
            format!("http://{}", self.domain)
        } else {
            format!("https://{}", self.domain)
        }
    }
}
