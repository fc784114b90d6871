//! Configuration system for Conductor.
//!
//! Sources, lowest precedence first: built-in defaults, the user config file,
//! the project config file, `CONDUCTOR_`-prefixed variables
//! (`CONDUCTOR_LLM__MODEL`), then the plain variables the deployment
//! environment already exports (`LLM_MODEL`, `MCP_TIMEOUT`, ...).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;

/// Environment variables checked for the model API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &[
    "LLM_API_KEY",
    "DASHSCOPE_API_KEY",
    "MCP_API_KEY",
    "API_KEY",
    "OPENAI_API_KEY",
];

/// Main configuration struct for Conductor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language model settings
    pub llm: LlmConfig,
    /// Descriptor registry settings
    pub registry: RegistryConfig,
    /// MCP execution settings
    pub mcp: McpConfig,
    /// Loop limits
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key (falls back to the well-known environment variables)
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Maximum tokens per response
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            model: "qwen-flash".to_string(),
            max_tokens: 4096,
            temperature: 0.3,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from either the direct value or the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Root directory of the descriptor tree
    pub root: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("mcp_registry"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Base URL prepended to a descriptor's `api_endpoint`
    pub base_url: String,
    /// Timeout for direct endpoint calls, in seconds
    pub timeout_secs: u64,
    /// Base URL for descriptors that carry no server config
    pub default_server_url: String,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.com".to_string(),
            timeout_secs: 30,
            default_server_url: "http://localhost:8000/mcp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum model turns while exploring the registry for one sub-task
    pub discovery_max_turns: usize,
    /// Maximum model turns while executing one planned task
    pub execution_max_turns: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            discovery_max_turns: 8,
            execution_max_turns: 6,
        }
    }
}

/// Validation result with multiple issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Create a new empty validation result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    /// Get only error-level issues.
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Error).collect()
    }

    /// Get only warning-level issues.
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Warning).collect()
    }

    /// Add an error.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning.
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue
    pub severity: IssueSeverity,
    /// Field path (e.g., "llm.base_url")
    pub field: String,
    /// Human-readable message
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// The layered figment behind [`Config::load`].
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(Self::config_dir().join("config.toml")))
            .merge(Toml::file(".conductor/config.toml"))
            .merge(Env::prefixed("CONDUCTOR_").split("__"))
            .merge(
                Env::raw()
                    .only(&["LLM_BASE_URL", "LLM_MODEL", "MCP_BASE_URL", "MCP_TIMEOUT"])
                    .map(|key| well_known_env_key(key.as_str()).into()),
            )
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        let result = config.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!(field = %warning.field, "Config warning: {}", warning.message);
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.llm.model.is_empty() {
            result.add_error("llm.model", "Model name cannot be empty");
        }

        for (field, url) in [
            ("llm.base_url", &self.llm.base_url),
            ("mcp.base_url", &self.mcp.base_url),
            ("mcp.default_server_url", &self.mcp.default_server_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                result.add_error(field, "URL must start with http:// or https://");
            }
        }

        if self.llm.max_tokens == 0 {
            result.add_error("llm.max_tokens", "max_tokens must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            result.add_error("llm.temperature", "temperature must be between 0.0 and 2.0");
        }

        if self.llm.api_key.as_deref() == Some("") {
            result.add_warning("llm.api_key", "API key is empty string");
        }

        if self.mcp.timeout_secs == 0 {
            result.add_error("mcp.timeout_secs", "timeout_secs must be greater than 0");
        }

        if self.limits.discovery_max_turns == 0 {
            result.add_error("limits.discovery_max_turns", "discovery_max_turns must be greater than 0");
        }

        if self.limits.execution_max_turns == 0 {
            result.add_error("limits.execution_max_turns", "execution_max_turns must be greater than 0");
        }

        if self.limits.discovery_max_turns > 50 {
            result.add_warning(
                "limits.discovery_max_turns",
                "discovery_max_turns is very high, a lost model may burn many requests",
            );
        }

        result
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("conductor"))
            .unwrap_or_else(|| PathBuf::from("~/.config/conductor"))
    }
}

/// Map a plain deployment variable onto its nested config key.
fn well_known_env_key(key: &str) -> String {
    match key.to_ascii_uppercase().as_str() {
        "LLM_BASE_URL" => "llm.base_url".to_string(),
        "LLM_MODEL" => "llm.model".to_string(),
        "MCP_BASE_URL" => "mcp.base_url".to_string(),
        "MCP_TIMEOUT" => "mcp.timeout_secs".to_string(),
        _ => key.to_ascii_lowercase(),
    }
}
