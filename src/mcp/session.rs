//! [`ToolSession`] backed by an MCP client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{ClientInfo, ProtocolVersion};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::SourceDescriptor;
use crate::error::ParleyError;
use crate::sessions::{RemoteToolSchema, SessionConnector, SessionState, ToolSession};

use super::client::MCPClient;
use super::transport::transport_for;

/// One open MCP connection. Calls on it are serialized.
pub struct McpSession {
    source_name: String,
    client: Mutex<Option<MCPClient>>,
    closed: AtomicBool,
}

impl McpSession {
    pub fn new(client: MCPClient) -> Self {
        Self {
            source_name: client.source_name().to_string(),
            client: Mutex::new(Some(client)),
            closed: AtomicBool::new(false),
        }
    }

    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            warn!(source = %self.source_name, "MCP session lost");
        }
    }

    /// A failure on a dead service means the session itself is gone.
    fn classify(&self, client: &MCPClient, err: ParleyError) -> ParleyError {
        if matches!(err, ParleyError::SessionUnavailable { .. }) {
            self.mark_closed();
            return err;
        }
        if client.is_closed() {
            self.mark_closed();
            return ParleyError::session_unavailable(&self.source_name, err.to_string());
        }
        err
    }

    fn unavailable(&self) -> ParleyError {
        ParleyError::session_unavailable(&self.source_name, "session is closed")
    }
}

#[async_trait]
impl ToolSession for McpSession {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn state(&self) -> SessionState {
        if self.closed.load(Ordering::SeqCst) {
            SessionState::Closed
        } else {
            SessionState::Open
        }
    }

    async fn list_tools(&self) -> Result<Vec<RemoteToolSchema>, ParleyError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(|| self.unavailable())?;
        client.list_tools().await.map_err(|e| self.classify(client, e))
    }

    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ParleyError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(|| self.unavailable())?;
        if client.is_closed() {
            self.mark_closed();
            return Err(self.unavailable());
        }
        client
            .call_tool(tool_name, arguments)
            .await
            .map(|result| result.into_value_or_text())
            .map_err(|e| self.classify(client, e))
    }

    async fn close(&self) -> Result<(), ParleyError> {
        self.closed.store(true, Ordering::SeqCst);
        let client = self.client.lock().await.take();
        match client {
            Some(client) => client.close().await,
            None => Ok(()),
        }
    }
}

/// Opens MCP sessions for every configured transport.
#[derive(Debug, Clone)]
pub struct McpConnector {
    client_info: ClientInfo,
}

impl Default for McpConnector {
    fn default() -> Self {
        Self {
            client_info: ClientInfo {
                protocol_version: ProtocolVersion::LATEST,
                ..Default::default()
            },
        }
    }
}

impl McpConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionConnector for McpConnector {
    async fn connect(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<Arc<dyn ToolSession>, ParleyError> {
        let transport = transport_for(&descriptor.transport);
        debug!(source = %descriptor.name, transport = %transport.kind(), "connecting MCP source");
        let service = transport
            .connect(&descriptor.name, self.client_info.clone())
            .await?;
        Ok(Arc::new(McpSession::new(MCPClient::from_running_service(
            &descriptor.name,
            service,
        ))))
    }
}
