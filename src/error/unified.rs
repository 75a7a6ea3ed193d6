//! Unified error classification.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broad error category, also the machine-readable `kind` of an error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Connection,
    ToolExecution,
    SessionUnavailable,
    Provider,
    Authentication,
    RateLimit,
    Network,
    Timeout,
    LoopExhausted,
    InvalidRequest,
    Serialization,
    Internal,
}

impl ErrorCategory {
    /// Stable code string used on the wire.
    pub fn code(self) -> String {
        self.to_string()
    }

    /// Caller-facing text for an error reply. Never carries error details.
    pub fn public_message(self) -> &'static str {
        match self {
            Self::InvalidRequest => "The request is invalid. Send a non-empty message.",
            Self::LoopExhausted => {
                "The assistant could not finish this request. Please try rephrasing it."
            }
            Self::Timeout => "The request took too long. Please try again.",
            Self::RateLimit => "The service is busy. Please try again shortly.",
            Self::SessionUnavailable | Self::Connection => {
                "A connected service is unavailable right now. Please try again later."
            }
            Self::ToolExecution => "A tool failed while handling the request.",
            Self::Provider | Self::Authentication | Self::Network => {
                "The language model is unavailable right now. Please try again later."
            }
            Self::Configuration | Self::Serialization | Self::Internal => {
                "An internal error occurred."
            }
        }
    }
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    ReconnectSource,
    RephraseRequest,
    ContactSupport,
}
