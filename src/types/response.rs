//! Inbound request and outbound reply shapes.

use serde::{Deserialize, Serialize};

use crate::error::ParleyError;

/// Thread used when the caller does not supply one.
pub const DEFAULT_THREAD_ID: &str = "default-thread";

/// One user utterance addressed to a conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl InboundMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            thread_id: None,
        }
    }

    pub fn on_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

/// Final answer plus the intent flags detected in it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentResponse {
    pub response: String,
    /// Name of the last tool invoked during the run, if any.
    pub tools: Option<String>,
    pub end_interaction: bool,
    pub connect_live_agent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Structured failure reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Only the category reaches the caller; the error's own text stays in the logs.
impl From<&ParleyError> for ErrorResponse {
    fn from(error: &ParleyError) -> Self {
        let category = error.category();
        Self {
            error: ErrorBody {
                kind: category.code(),
                message: category.public_message().to_string(),
            },
        }
    }
}

/// What the front door serializes back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Reply {
    Answer(AgentResponse),
    Failure(ErrorResponse),
}

impl From<Result<AgentResponse, ParleyError>> for Reply {
    fn from(result: Result<AgentResponse, ParleyError>) -> Self {
        match result {
            Ok(response) => Self::Answer(response),
            Err(error) => Self::Failure(ErrorResponse::from(&error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn answer_serializes_flat() {
        let reply = Reply::Answer(AgentResponse {
            response: "It's midnight.".into(),
            tools: Some("time_tool".into()),
            end_interaction: false,
            connect_live_agent: false,
        });
        assert_eq!(
            serde_json::to_value(&reply).expect("reply should serialize"),
            json!({
                "response": "It's midnight.",
                "tools": "time_tool",
                "end_interaction": false,
                "connect_live_agent": false
            })
        );
    }

    #[test]
    fn failure_carries_kind_and_message() {
        let reply = Reply::from(Err(ParleyError::LoopExhausted { iterations: 4 }));
        let value = serde_json::to_value(&reply).expect("reply should serialize");
        assert_eq!(value["error"]["kind"], "loop_exhausted");
        assert!(value["error"]["message"]
            .as_str()
            .is_some_and(|m| m.contains("rephrasing")));
    }

    #[test]
    fn failure_hides_upstream_error_text() {
        let reply = Reply::from(Err(ParleyError::api(
            500,
            "Traceback (most recent call last): password=hunter2",
        )));
        let rendered = serde_json::to_string(&reply).expect("reply should serialize");
        assert!(rendered.contains("\"kind\":\"provider\""));
        assert!(!rendered.contains("Traceback"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn inbound_thread_id_is_optional() {
        let inbound: InboundMessage =
            serde_json::from_value(json!({"message": "hi"})).expect("should parse");
        assert_eq!(inbound, InboundMessage::new("hi"));
    }
}
