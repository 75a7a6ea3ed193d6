//! Configuration (TOML file, then environment overrides).

pub mod sources;

pub use sources::{SourceDescriptor, SourceTransport, TransportKind};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ParleyError;
use crate::types::DEFAULT_THREAD_ID;

/// Prompt prepended to every model request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a customer-facing assistant that can call external tools.

Tools:
- `web_search` for current or general information from the web.
- `time_tool` only when the user asks for the current date or time.
- `mcp_query_personal_info` only when the user gives an email address to look up.
- `query_postgres_tool` to run SQL against the internal database. Keep result sets small.
- Tools from connected services (math, weather and others) when they fit the request better.

Rules:
1. Be truthful, concise and polite. Answer in English unless asked otherwise.
2. Call tools only when needed and summarize their results; never paste raw JSON, keys or stack traces.
3. Ask a clarifying question when the request is ambiguous.
4. When the user wants to end the conversation, ask them to reply 'end conversation' or '结束通话' to confirm. After they confirm, reply with exactly `end_current_conversation`.
5. When the user asks for a person, an operator or a live agent, reply with exactly `connect_live_agent`.
6. When the user asks to hear a dog bark, reply 'bark, bark, bark', or 'wang, wang, wang' if they wrote in Chinese.
";

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub tools: LocalToolsConfig,
    pub memory: MemoryConfig,
    pub intent: IntentConfig,
    pub sources: Vec<SourceDescriptor>,
}

/// Chat-completions endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/v1".into(),
            model: "deepseek-chat".into(),
            api_key_env: "DEEPSEEK_API_KEY".into(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ModelConfig {
    pub fn api_key(&self) -> Result<String, ParleyError> {
        std::env::var(&self.api_key_env).map_err(|_| {
            ParleyError::Configuration(format!("Missing API key: set {}", self.api_key_env))
        })
    }
}

/// Decision loop bounds and prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub run_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub default_thread_id: String,
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            run_timeout_secs: 120,
            tool_timeout_secs: 30,
            connect_timeout_secs: 20,
            default_thread_id: DEFAULT_THREAD_ID.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

impl AgentConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Settings for the built-in local tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalToolsConfig {
    pub tavily_base_url: String,
    pub tavily_api_key_env: String,
    pub search_max_results: u32,
    /// Base URL of the personal-info lookup service.
    pub personal_info_url: String,
    pub postgres_url: Option<String>,
}

impl Default for LocalToolsConfig {
    fn default() -> Self {
        Self {
            tavily_base_url: "https://api.tavily.com".into(),
            tavily_api_key_env: "TAVILY_API_KEY".into(),
            search_max_results: 2,
            personal_info_url: "http://localhost:8080".into(),
            postgres_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckpointMode {
    #[default]
    None,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub checkpoint: CheckpointMode,
    /// Defaults to `~/.parley/threads`.
    pub checkpoint_dir: Option<PathBuf>,
}

impl MemoryConfig {
    pub fn resolved_checkpoint_dir(&self) -> PathBuf {
        self.checkpoint_dir.clone().unwrap_or_else(|| {
            directories::UserDirs::new()
                .map(|dirs| dirs.home_dir().join(".parley").join("threads"))
                .unwrap_or_else(|| PathBuf::from(".parley/threads"))
        })
    }
}

/// Optional overrides for the intent keyword sets.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct IntentConfig {
    pub end_markers: Option<Vec<String>>,
    pub live_agent_markers: Option<Vec<String>>,
}

impl AppConfig {
    /// Load `.env`, then the TOML file if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ParleyError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    ParleyError::Configuration(format!("Cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ParleyError> {
        toml::from_str(raw).map_err(|e| ParleyError::Configuration(format!("Invalid config: {e}")))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PARLEY_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = lookup("PARLEY_MODEL") {
            self.model.model = model;
        }
        if let Some(max) = lookup("PARLEY_MAX_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.agent.max_iterations = max;
        }
        if let Some(url) = lookup("MCP_SERVER_URL") {
            self.tools.personal_info_url = url;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.tools.postgres_url = Some(url);
        } else if self.tools.postgres_url.is_none() {
            if let Some(host) = lookup("POSTGRES_HOST") {
                let port = lookup("POSTGRES_PORT").unwrap_or_else(|| "5432".into());
                let user = lookup("POSTGRES_USER").unwrap_or_else(|| "postgres".into());
                let password = lookup("POSTGRES_PASSWORD").unwrap_or_default();
                let db = lookup("POSTGRES_DB").unwrap_or_else(|| "postgres".into());
                self.tools.postgres_url =
                    Some(format!("postgres://{user}:{password}@{host}:{port}/{db}"));
            }
        }
    }

    pub fn validate(&self) -> Result<(), ParleyError> {
        if self.agent.max_iterations == 0 {
            return Err(ParleyError::Configuration(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if self.agent.default_thread_id.trim().is_empty() {
            return Err(ParleyError::Configuration(
                "agent.default_thread_id must not be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            let name = source.name.trim();
            if name.is_empty() {
                return Err(ParleyError::Configuration(
                    "Tool source name must not be empty".into(),
                ));
            }
            if !seen.insert(name) {
                return Err(ParleyError::Configuration(format!(
                    "Duplicate tool source '{name}'"
                )));
            }
        }
        Ok(())
    }
}
