//! Session wrapper that admits one request at a time.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{RemoteToolSchema, SessionState, ToolSession};
use crate::error::ParleyError;

/// Queues concurrent requests on a long-lived session.
///
/// Different sessions each carry their own gate and never wait on each other.
/// `close` skips the gate so a hung call cannot hold up shutdown.
pub struct SerializedSession {
    inner: Arc<dyn ToolSession>,
    gate: Mutex<()>,
}

impl SerializedSession {
    pub fn new(inner: Arc<dyn ToolSession>) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ToolSession for SerializedSession {
    fn source_name(&self) -> &str {
        self.inner.source_name()
    }

    fn state(&self) -> SessionState {
        self.inner.state()
    }

    async fn list_tools(&self) -> Result<Vec<RemoteToolSchema>, ParleyError> {
        let _turn = self.gate.lock().await;
        self.inner.list_tools().await
    }

    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ParleyError> {
        let _turn = self.gate.lock().await;
        self.inner.call_tool(tool_name, arguments).await
    }

    async fn close(&self) -> Result<(), ParleyError> {
        self.inner.close().await
    }
}
