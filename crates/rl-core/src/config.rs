use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {name}")]
    Missing { name: &'static str },
    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Analyzer endpoint configuration. Plain OpenAI-style endpoints use
/// `endpoint` + `model`; Azure OpenAI uses `endpoint` + `deployment`.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub deployment: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub organization: String,
    pub pat: String,
    /// Externally reachable base URL, used when registering service hooks.
    pub public_url: String,
    pub webhook_secret: Option<String>,
    pub db_path: String,
    pub port: u16,
    pub workers: usize,
    pub agent_timeout: Duration,
    pub analyzer_concurrency: usize,
    pub platform_timeout: Duration,
    /// Queue redelivery window; must exceed the agent deadline so a live
    /// agent never sees its own event redelivered.
    pub visibility_timeout: Duration,
    pub state_ttl: Duration,
    pub analyzer: AnalyzerSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let analyzer = AnalyzerSettings {
            endpoint: optional("OPENAI_BASE_URL")
                .or_else(|| optional("AZURE_OPENAI_ENDPOINT"))
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key: required("OPENAI_API_KEY")?,
            model: optional("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            deployment: optional("AZURE_OPENAI_DEPLOYMENT"),
            timeout: Duration::from_secs(60),
        };

        Ok(Self {
            organization: required("AZURE_DEVOPS_ORG")?,
            pat: required("AZURE_DEVOPS_PAT")?,
            public_url: optional("REDLINE_PUBLIC_URL")
                .unwrap_or_else(|| "http://localhost:4870".to_string()),
            webhook_secret: optional("WEBHOOK_SECRET"),
            db_path: optional("REDLINE_DB_PATH").unwrap_or_else(|| ".redline/redline.db".to_string()),
            port: parsed("REDLINE_PORT", 4870)?,
            workers: parsed("REDLINE_WORKERS", 3)?,
            agent_timeout: Duration::from_secs(parsed("REDLINE_AGENT_TIMEOUT_SECS", 600)?),
            analyzer_concurrency: parsed("REDLINE_ANALYZER_CONCURRENCY", 8)?,
            platform_timeout: Duration::from_secs(30),
            visibility_timeout: Duration::from_secs(900),
            state_ttl: Duration::from_secs(24 * 60 * 60),
            analyzer,
        })
    }

    pub fn webhook_url(&self) -> String {
        format!(
            "{}/api/webhooks/azure-devops/pr",
            self.public_url.trim_end_matches('/')
        )
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing { name })
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            message: err.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
