//! Remote tools discovered at runtime from a tool session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::ToolParameters;
use crate::error::ParleyError;
use crate::sessions::{self, ToolSession};

/// Exposes one remote tool through the core [`Tool`] trait.
pub struct RemoteTool {
    session: Arc<dyn ToolSession>,
    name: String,
    description: String,
    parameters: ToolParameters,
    timeout: Duration,
}

impl RemoteTool {
    pub fn new(
        session: Arc<dyn ToolSession>,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        timeout: Duration,
    ) -> Self {
        Self {
            session,
            name: name.into(),
            description: description.into(),
            parameters,
            timeout,
        }
    }

    pub fn source_name(&self) -> &str {
        self.session.source_name()
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        _ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, ParleyError> {
        sessions::invoke(
            self.session.as_ref(),
            &self.name,
            args.raw().clone(),
            self.timeout,
        )
        .await
    }
}

impl std::fmt::Debug for RemoteTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTool")
            .field("source", &self.session.source_name())
            .field("name", &self.name)
            .finish()
    }
}
