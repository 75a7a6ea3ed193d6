//! Error types for Parley.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all Parley operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A tool source could not be opened.
    #[error("Connection error ({source_name}): {message}")]
    Connection { source_name: String, message: String },

    /// A tool ran but failed; recoverable, fed back to the model.
    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    /// The session behind a tool is gone; aborts the current run.
    #[error("Tool session '{source_name}' unavailable: {message}")]
    SessionUnavailable { source_name: String, message: String },

    #[error("Tool '{0}' not found")]
    UnknownTool(String),

    #[error("Decision loop exhausted after {iterations} iterations without a final answer")]
    LoopExhausted { iterations: usize },

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ParleyError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    pub fn connection(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn session_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SessionUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::ToolExecution { .. } | Self::UnknownTool(_) => ErrorCategory::ToolExecution,
            Self::SessionUnavailable { .. } => ErrorCategory::SessionUnavailable,
            Self::LoopExhausted { .. } => ErrorCategory::LoopExhausted,
            Self::Provider { .. } => ErrorCategory::Provider,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                _ => ErrorCategory::Provider,
            },
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::InvalidArgument(_) => ErrorCategory::InvalidRequest,
            Self::Io(_) | Self::InvalidState(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a failure raised while executing a tool must end the whole run.
    ///
    /// Everything else a tool returns is reported back to the model as an observation.
    pub fn aborts_run(&self) -> bool {
        matches!(self, Self::SessionUnavailable { .. })
    }

    /// Whether this error is potentially retryable by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Timeout
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit | ErrorCategory::Network => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Connection | ErrorCategory::SessionUnavailable => {
                RecoverySuggestion::ReconnectSource
            }
            ErrorCategory::LoopExhausted | ErrorCategory::InvalidRequest => {
                RecoverySuggestion::RephraseRequest
            }
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_session_loss_aborts_a_run() {
        assert!(ParleyError::session_unavailable("weather", "closed").aborts_run());
        assert!(!ParleyError::tool("weather", "bad city").aborts_run());
        assert!(!ParleyError::Timeout(30_000).aborts_run());
        assert!(!ParleyError::UnknownTool("nope".into()).aborts_run());
    }

    #[test]
    fn api_status_maps_to_category() {
        assert_eq!(ParleyError::api(401, "no").category(), ErrorCategory::Authentication);
        assert_eq!(ParleyError::api(429, "slow").category(), ErrorCategory::RateLimit);
        assert_eq!(ParleyError::api(500, "boom").category(), ErrorCategory::Provider);
    }

    #[test]
    fn category_codes_are_snake_case() {
        assert_eq!(ErrorCategory::LoopExhausted.code(), "loop_exhausted");
        assert_eq!(ErrorCategory::InvalidRequest.code(), "invalid_request");
        let err = ParleyError::LoopExhausted { iterations: 3 };
        assert_eq!(err.recovery_suggestion(), RecoverySuggestion::RephraseRequest);
    }
}
