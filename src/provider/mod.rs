//! Model provider boundary.
//!
//! The decision loop only sees [`ModelProvider::decide`]: given the
//! conversation and the tool specs, the model either answers or asks for tool
//! calls. Provider failures surface as provider-category [`ParleyError`]s and
//! are never retried here.

pub mod http;
pub mod openai_compatible;

pub use openai_compatible::OpenAiCompatibleProvider;

use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::ParleyError;
use crate::tools::ToolSpec;
use crate::types::{Message, ToolCall};

/// Sampling settings forwarded to the provider.
#[derive(Debug, Clone, Default, Builder, Serialize, Deserialize, PartialEq)]
pub struct ModelSettings {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// A request sent to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub settings: ModelSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// Raw response from a provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

/// What the model decided to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDecision {
    Final { text: String },
    /// Tool calls win over any text returned alongside them.
    ToolCalls { text: String, calls: Vec<ToolCall> },
}

impl From<ProviderResponse> for ModelDecision {
    fn from(response: ProviderResponse) -> Self {
        if response.tool_calls.is_empty() {
            Self::Final {
                text: response.text,
            }
        } else {
            Self::ToolCalls {
                text: response.text,
                calls: response.tool_calls,
            }
        }
    }
}

/// Core trait implemented by model backends.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn model_id(&self) -> &str;

    /// One non-streaming completion.
    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ParleyError>;

    async fn decide(&self, request: &ProviderRequest) -> Result<ModelDecision, ParleyError> {
        self.generate(request).await.map(ModelDecision::from)
    }
}

/// Provider for the configured chat-completions endpoint.
pub fn create_provider(config: &ModelConfig) -> Result<Box<dyn ModelProvider>, ParleyError> {
    let api_key = config.api_key()?;
    let settings = ModelSettings {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };
    Ok(Box::new(
        OpenAiCompatibleProvider::new(config.model.clone(), api_key, config.base_url.clone())
            .with_settings(settings),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_calls_take_precedence_over_text() {
        let decision = ModelDecision::from(ProviderResponse {
            text: "Let me check.".into(),
            tool_calls: vec![ToolCall::new("c1", "time_tool", json!({}))],
            ..Default::default()
        });
        assert!(matches!(decision, ModelDecision::ToolCalls { ref text, ref calls }
            if text == "Let me check." && calls.len() == 1));

        let decision = ModelDecision::from(ProviderResponse {
            text: "Hello".into(),
            ..Default::default()
        });
        assert_eq!(decision, ModelDecision::Final { text: "Hello".into() });
    }

    #[test]
    fn settings_builder_sets_fields() {
        let settings = ModelSettings::builder().temperature(0.3).build();
        assert_eq!(settings.temperature, Some(0.3));
        assert_eq!(settings.max_tokens, None);
    }
}
