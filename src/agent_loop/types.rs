//! Core run types for the decision loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::types::Message;

/// Unique run identifier.
pub type RunId = Uuid;

/// Bounds applied to one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    /// Model invocations allowed before the run is exhausted.
    pub max_iterations: usize,
    pub run_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            run_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&AgentConfig> for LoopLimits {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            run_timeout: config.run_timeout(),
            tool_timeout: config.tool_timeout(),
        }
    }
}

/// A completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// Messages committed to the thread by this run.
    pub turn: Vec<Message>,
    pub final_text: String,
    /// Last tool actually invoked, in call order.
    pub last_tool: Option<String>,
    pub iterations: usize,
}
