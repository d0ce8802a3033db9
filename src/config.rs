//! Configuration system for the diagnosis crew service
//!
//! Configuration lives in a TOML file with three sections (`[server]`,
//! `[llm]`, `[crew]`). Every field has a default, so a missing file yields a
//! runnable configuration. Secrets are never stored in the file: only the
//! names of the environment variables holding them.

use crate::crew::{CrewDefinition, CrewSettings};
use crate::llm::providers::openai::OpenAiConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Files probed, in order, when no explicit path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["diagnosis.toml", "config/diagnosis.toml"];

/// Main service configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub crew: CrewSection,
}

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// The single origin allowed by CORS
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Environment variable containing the bearer token
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            auth_token_env: default_auth_token_env(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_auth_token_env() -> String {
    "DIAGNOSIS_API_TOKEN".to_string()
}

/// LLM section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name; only "openai" is supported
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Override for the provider's API base URL
    pub base_url: Option<String>,
    /// Optional temperature (0.0 to 2.0)
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: None,
            temperature: None,
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

/// Crew section; agents and tasks fall back to the built-in crew when both are empty
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrewSection {
    /// Characters of a step's expected output kept as its subtask summary
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
    #[serde(default)]
    pub agents: Vec<crate::crew::AgentDefinition>,
    #[serde(default)]
    pub tasks: Vec<crate::crew::TaskDefinition>,
}

impl Default for CrewSection {
    fn default() -> Self {
        Self {
            summary_chars: default_summary_chars(),
            agents: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

fn default_summary_chars() -> usize {
    100
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServiceConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the explicit path if given, otherwise the first default path that exists
    ///
    /// An explicit path must exist. With no file found, defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        match Self::discover(DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from)) {
            Some(path) => {
                info!(path = %path.display(), "Using configuration file");
                Self::load_from_file(&path)
            }
            None => {
                info!("No configuration file found; using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    fn discover(candidates: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
        candidates.into_iter().find(|p| p.is_file())
    }

    /// Check field ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be non-zero".to_string(),
            ));
        }
        self.server
            .host
            .parse::<IpAddr>()
            .map_err(|e| invalid(format!("server.host '{}': {e}", self.server.host)))?;
        normalize_origin(&self.server.cors_origin)?;
        if self.server.auth_token_env.trim().is_empty() {
            return Err(invalid("server.auth_token_env must not be empty"));
        }

        if !self.llm.provider.eq_ignore_ascii_case("openai") {
            return Err(invalid(format!(
                "unsupported llm.provider '{}'",
                self.llm.provider
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(invalid("llm.model must not be empty"));
        }
        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(invalid(format!(
                    "llm.temperature {temperature} outside 0.0..=2.0"
                )));
            }
        }
        if let Some(base_url) = &self.llm.base_url {
            url::Url::parse(base_url)
                .map_err(|e| invalid(format!("llm.base_url '{base_url}': {e}")))?;
        }
        if self.llm.timeout_secs == 0 {
            return Err(invalid("llm.timeout_secs must be non-zero"));
        }

        if self.crew.summary_chars == 0 {
            return Err(invalid("crew.summary_chars must be non-zero"));
        }
        self.crew_definition()
            .validate()
            .map_err(|e| invalid(format!("crew: {e}")))?;

        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|e| invalid(format!("server.host '{}': {e}", self.server.host)))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// The CORS origin in its normalized `scheme://host[:port]` form
    pub fn cors_origin(&self) -> Result<String, ConfigError> {
        normalize_origin(&self.server.cors_origin)
    }

    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Get the bearer token from its environment variable
    pub fn get_auth_token(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.server.auth_token_env)
    }

    /// Get the LLM API key from its environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.llm.api_key_env)
    }

    /// Provider settings, with the API key resolved from the environment
    pub fn openai_config(&self) -> Result<OpenAiConfig, ConfigError> {
        let mut config = OpenAiConfig {
            api_key: self.get_llm_api_key()?,
            timeout: Duration::from_secs(self.llm.timeout_secs),
            max_retries: self.llm.max_retries,
            ..OpenAiConfig::default()
        };
        if let Some(base_url) = &self.llm.base_url {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        Ok(config)
    }

    pub fn crew_settings(&self) -> CrewSettings {
        CrewSettings {
            model: self.llm.model.clone(),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            summary_chars: self.crew.summary_chars,
        }
    }

    /// Configured crew, or the built-in one when none is configured
    pub fn crew_definition(&self) -> CrewDefinition {
        if self.crew.agents.is_empty() && self.crew.tasks.is_empty() {
            CrewDefinition::default()
        } else {
            CrewDefinition {
                agents: self.crew.agents.clone(),
                tasks: self.crew.tasks.clone(),
            }
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8080
cors_origin = "http://localhost:3000"
auth_token_env = "TEST_DIAGNOSIS_TOKEN"

[llm]
model = "gpt-4o-mini"
api_key_env = "TEST_OPENAI_KEY"
temperature = 0.2
max_tokens = 2000
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidConfig(message.into())
}

/// Reduce an origin to `scheme://host[:port]`, rejecting paths and non-http schemes
pub fn normalize_origin(origin: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(origin.trim())
        .map_err(|e| invalid(format!("server.cors_origin '{origin}': {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!(
            "server.cors_origin '{origin}' must use http or https"
        )));
    }
    if parsed.host_str().is_none() {
        return Err(invalid(format!("server.cors_origin '{origin}' has no host")));
    }
    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid(format!(
            "server.cors_origin '{origin}' must not contain a path"
        )));
    }

    Ok(parsed.origin().ascii_serialization())
}
