//! Session wrapper for stateless sources that are opened per invocation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{RemoteToolSchema, SessionConnector, SessionState, ToolSession};
use crate::config::SourceDescriptor;
use crate::error::ParleyError;
use crate::util::with_timeout;

/// Opens a fresh underlying session for each call and closes it afterwards.
pub struct PerCallSession {
    descriptor: SourceDescriptor,
    connector: Arc<dyn SessionConnector>,
    connect_timeout: Duration,
}

impl PerCallSession {
    pub fn new(
        descriptor: SourceDescriptor,
        connector: Arc<dyn SessionConnector>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            descriptor,
            connector,
            connect_timeout,
        }
    }

    async fn open_inner(&self) -> Result<Arc<dyn ToolSession>, ParleyError> {
        debug!(source = %self.descriptor.name, "opening per-call session");
        with_timeout(self.connect_timeout, self.connector.connect(&self.descriptor)).await
    }

    async fn release(&self, inner: Arc<dyn ToolSession>) {
        if let Err(err) = inner.close().await {
            warn!(source = %self.descriptor.name, error = %err, "failed to close per-call session");
        }
    }
}

#[async_trait]
impl ToolSession for PerCallSession {
    fn source_name(&self) -> &str {
        &self.descriptor.name
    }

    /// Always open: each call brings its own connection.
    fn state(&self) -> SessionState {
        SessionState::Open
    }

    async fn list_tools(&self) -> Result<Vec<RemoteToolSchema>, ParleyError> {
        let inner = self.open_inner().await?;
        let tools = inner.list_tools().await;
        self.release(inner).await;
        tools
    }

    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ParleyError> {
        // A failed open only affects this call, so it is a recoverable tool error.
        let inner = self
            .open_inner()
            .await
            .map_err(|err| ParleyError::tool(tool_name, err.to_string()))?;
        let result = inner.call_tool(tool_name, arguments).await;
        self.release(inner).await;
        match result {
            Err(ParleyError::SessionUnavailable { message, .. }) => {
                Err(ParleyError::tool(tool_name, message))
            }
            other => other,
        }
    }

    async fn close(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}
