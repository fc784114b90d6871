//! Error types for Conductor.
//!
//! Library crates keep their own error enums; everything that reaches the
//! binary is folded into [`Error`], which knows how to suggest a fix.

use thiserror::Error;

/// Result type alias using the Conductor error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Conductor.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider error with structured details
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// Registry lookup or parse error
    #[error("Registry error: {0}")]
    Registry(String),

    /// Tool execution error
    #[error("Tool error: {0}")]
    Tool(String),

    /// MCP error
    #[error("MCP error: {0}")]
    Mcp(String),

    /// A pipeline stage failed hard
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Config(_) => Some("Check ~/.config/conductor/config.toml or .conductor/config.toml"),
            Error::Provider(e) => e.recovery_suggestion(),
            Error::Registry(_) | Error::NotFound(_) => {
                Some("Check the registry root with 'conductor registry ls /'")
            }
            Error::Mcp(_) => Some("Make sure the MCP servers named in the registry are reachable"),
            Error::Pipeline(_) => Some("Re-run with --verbose to see the raw model output"),
            _ => None,
        }
    }

    /// Create a provider-not-configured error.
    pub fn provider_not_configured(provider: &str) -> Self {
        Error::Provider(ProviderError::NotConfigured {
            provider: provider.to_string(),
            env_var: Some("LLM_API_KEY".to_string()),
        })
    }
}

/// Provider-specific errors with detailed context.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider not configured
    #[error("Provider '{provider}' is not configured")]
    NotConfigured {
        provider: String,
        env_var: Option<String>,
    },

    /// API request failed
    #[error("API request to {provider} failed: {status} - {message}")]
    ApiError {
        provider: String,
        status: u16,
        message: String,
    },

    /// Streaming error
    #[error("Streaming error from {provider}: {message}")]
    StreamError { provider: String, message: String },

    /// Timeout
    #[error("Request to {provider} timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },
}

impl ProviderError {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ProviderError::NotConfigured {
                env_var: Some(_), ..
            } => Some("Set LLM_API_KEY (or DASHSCOPE_API_KEY / OPENAI_API_KEY)"),
            ProviderError::NotConfigured { .. } => Some("Set llm.api_key in the config file"),
            ProviderError::ApiError { status: 401, .. } => {
                Some("Check that your API key is valid and not expired")
            }
            ProviderError::ApiError { status: 429, .. } => {
                Some("You've hit rate limits. Wait a moment and try again")
            }
            ProviderError::ApiError {
                status: 500..=599, ..
            } => Some("The model service is having issues. Try again later"),
            ProviderError::Timeout { .. } => Some("Check your network connection"),
            _ => None,
        }
    }

    /// Create an API error from status code and message.
    pub fn api_error(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ProviderError::ApiError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }
}

/// Format an error with its recovery suggestion.
pub fn format_error_with_suggestion(error: &Error) -> String {
    let mut output = error.to_string();
    if let Some(suggestion) = error.recovery_suggestion() {
        output.push_str(&format!("\n  Suggestion: {}", suggestion));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_not_configured() {
        let err = Error::provider_not_configured("dashscope");
        assert!(err.to_string().contains("dashscope"));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_api_error_suggestions() {
        let err = ProviderError::api_error("openai", 429, "Rate limited");
        assert!(err.to_string().contains("429"));
        assert!(err.recovery_suggestion().is_some());

        let err = ProviderError::api_error("openai", 400, "Bad request");
        assert!(err.recovery_suggestion().is_none());
    }

    #[test]
    fn test_format_with_suggestion() {
        let err = Error::Pipeline("plan could not be parsed".to_string());
        let text = format_error_with_suggestion(&err);
        assert!(text.starts_with("Pipeline error: plan could not be parsed"));
        assert!(text.contains("Suggestion: Re-run with --verbose"));
    }

    #[test]
    fn test_format_without_suggestion() {
        let err = Error::Validation("bad".to_string());
        assert_eq!(format_error_with_suggestion(&err), "Validation error: bad");
    }
}
