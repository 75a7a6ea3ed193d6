//! Convenience re-exports for common use.

pub use crate::agent::{AgentRuntime, RuntimeOptions};
pub use crate::agent_loop::{DecisionLoop, LoopLimits};
pub use crate::config::{AppConfig, SourceDescriptor, SourceTransport};
pub use crate::error::{ParleyError, Result};
pub use crate::intent::{Intent, IntentClassifier};
pub use crate::memory::ConversationStore;
pub use crate::provider::{ModelDecision, ModelProvider};
pub use crate::tools::{AgentTool, Tool, ToolArguments, ToolParameters, ToolRegistry};
pub use crate::types::{AgentResponse, InboundMessage, Message, Reply, Role};
