//! Tool session management.
//!
//! A [`ToolSession`] is one live connection to a remote tool source. The
//! [`SessionManager`] opens sessions from [`SourceDescriptor`]s, keeps them for
//! the process lifetime, hands their tools to the registry and closes them on
//! shutdown. Long-lived sessions are opened once and take one request at a
//! time; `per_call` sources get a fresh session for every invocation.

mod per_call;
mod serialized;

pub use per_call::PerCallSession;
pub use serialized::SerializedSession;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::SourceDescriptor;
use crate::error::ParleyError;
use crate::tools::dynamic::RemoteTool;
use crate::tools::registry::{SourceTools, ToolDefinition, ToolOrigin};
use crate::tools::types::ToolParameters;
use crate::util::with_timeout;

/// Schema for a tool exposed by a remote source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteToolSchema {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Open,
    Closed,
}

/// One connection to a remote tool source.
///
/// The manager wraps long-lived sessions in a [`SerializedSession`], so
/// implementations may assume calls arrive one at a time.
#[async_trait]
pub trait ToolSession: Send + Sync {
    fn source_name(&self) -> &str;

    fn state(&self) -> SessionState;

    async fn list_tools(&self) -> Result<Vec<RemoteToolSchema>, ParleyError>;

    /// Call a tool. A transport that is gone must surface as
    /// [`ParleyError::SessionUnavailable`] and leave the session `Closed`.
    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ParleyError>;

    async fn close(&self) -> Result<(), ParleyError>;
}

/// Opens sessions for a transport family.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<Arc<dyn ToolSession>, ParleyError>;
}

/// Invoke `tool_name` on `session`, bounded by `timeout`.
///
/// Every failure comes back as a tool-level error: `SessionUnavailable` when
/// the session is gone, otherwise a recoverable `ToolExecution` or `Timeout`.
pub async fn invoke(
    session: &dyn ToolSession,
    tool_name: &str,
    arguments: serde_json::Value,
    timeout: Duration,
) -> Result<serde_json::Value, ParleyError> {
    if session.state() == SessionState::Closed {
        return Err(ParleyError::session_unavailable(
            session.source_name(),
            "session is closed",
        ));
    }

    debug!(source = session.source_name(), tool = tool_name, "invoking remote tool");
    match with_timeout(timeout, session.call_tool(tool_name, arguments)).await {
        Ok(value) => Ok(value),
        Err(
            err @ (ParleyError::SessionUnavailable { .. }
            | ParleyError::ToolExecution { .. }
            | ParleyError::Timeout(_)),
        ) => Err(err),
        Err(other) => Err(ParleyError::tool(tool_name, other.to_string())),
    }
}

/// Connect and call timeouts applied by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub connect: Duration,
    pub call: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(20),
            call: Duration::from_secs(30),
        }
    }
}

/// Result of opening one configured source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHealth {
    pub name: String,
    pub error: Option<String>,
}

impl SourceHealth {
    pub fn is_ready(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone)]
struct SessionEntry {
    descriptor: SourceDescriptor,
    session: Arc<dyn ToolSession>,
}

/// Owns every tool session of the process.
pub struct SessionManager {
    connector: Arc<dyn SessionConnector>,
    timeouts: SessionTimeouts,
    entries: RwLock<Vec<SessionEntry>>,
    /// Sources that failed to open, kept so they can be reconnected later.
    failed: RwLock<Vec<SourceDescriptor>>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn SessionConnector>, timeouts: SessionTimeouts) -> Self {
        Self {
            connector,
            timeouts,
            entries: RwLock::new(Vec::new()),
            failed: RwLock::new(Vec::new()),
        }
    }

    pub fn timeouts(&self) -> SessionTimeouts {
        self.timeouts
    }

    async fn connect(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<Arc<dyn ToolSession>, ParleyError> {
        if descriptor.per_call {
            return Ok(Arc::new(PerCallSession::new(
                descriptor.clone(),
                self.connector.clone(),
                self.timeouts.connect,
            )));
        }

        let session = with_timeout(self.timeouts.connect, self.connector.connect(descriptor))
            .await
            .map_err(|err| match err {
                ParleyError::Connection { .. } => err,
                ParleyError::Timeout(ms) => ParleyError::connection(
                    &descriptor.name,
                    format!("timed out after {ms}ms"),
                ),
                other => ParleyError::connection(&descriptor.name, other.to_string()),
            })?;
        Ok(Arc::new(SerializedSession::new(session)))
    }

    /// Open one source and keep its session. Replaces a session with the same name.
    pub async fn open(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<Arc<dyn ToolSession>, ParleyError> {
        let session = self.connect(descriptor).await?;
        info!(source = %descriptor.name, transport = %descriptor.transport.kind(), "tool source opened");
        self.failed
            .write()
            .await
            .retain(|d| d.name != descriptor.name);

        let previous = {
            let mut entries = self.entries.write().await;
            let entry = SessionEntry {
                descriptor: descriptor.clone(),
                session: session.clone(),
            };
            match entries.iter().position(|e| e.descriptor.name == descriptor.name) {
                Some(index) => Some(std::mem::replace(&mut entries[index], entry)),
                None => {
                    entries.push(entry);
                    None
                }
            }
        };
        if let Some(previous) = previous {
            close_quietly(&previous.session).await;
        }
        Ok(session)
    }

    /// Open every source, in order, tolerating individual failures.
    ///
    /// Sources are connected concurrently but kept in configuration order.
    pub async fn open_all(&self, descriptors: &[SourceDescriptor]) -> Vec<SourceHealth> {
        let attempts = futures::future::join_all(descriptors.iter().map(|d| self.connect(d))).await;

        let mut health = Vec::with_capacity(descriptors.len());
        let mut entries = self.entries.write().await;
        let mut failed = self.failed.write().await;
        for (descriptor, attempt) in descriptors.iter().zip(attempts) {
            match attempt {
                Ok(session) => {
                    info!(source = %descriptor.name, transport = %descriptor.transport.kind(), "tool source opened");
                    entries.retain(|e| e.descriptor.name != descriptor.name);
                    failed.retain(|d| d.name != descriptor.name);
                    entries.push(SessionEntry {
                        descriptor: descriptor.clone(),
                        session,
                    });
                    health.push(SourceHealth {
                        name: descriptor.name.clone(),
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(source = %descriptor.name, error = %err, "tool source unavailable, skipping");
                    failed.retain(|d| d.name != descriptor.name);
                    failed.push(descriptor.clone());
                    health.push(SourceHealth {
                        name: descriptor.name.clone(),
                        error: Some(err.to_string()),
                    });
                }
            }
        }
        health
    }

    /// Session for a source name.
    pub async fn get(&self, source_name: &str) -> Option<Arc<dyn ToolSession>> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.descriptor.name == source_name)
            .map(|e| e.session.clone())
    }

    /// Names of open sources, in configuration order.
    pub async fn source_names(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| e.descriptor.name.clone())
            .collect()
    }

    /// Tool definitions exposed by one session, wired to invoke through it.
    pub async fn list_tools(&self, source_name: &str) -> Result<Vec<ToolDefinition>, ParleyError> {
        let entry = self.entry(source_name).await?;
        let call_timeout = entry
            .descriptor
            .call_timeout()
            .unwrap_or(self.timeouts.call);

        let schemas = with_timeout(self.timeouts.call, entry.session.list_tools()).await?;
        Ok(schemas
            .into_iter()
            .map(|schema| {
                let tool = RemoteTool::new(
                    entry.session.clone(),
                    schema.name,
                    schema.description.unwrap_or_default(),
                    ToolParameters::from_schema(schema.input_schema),
                    call_timeout,
                );
                ToolDefinition::new(ToolOrigin::Remote(source_name.to_string()), Arc::new(tool))
            })
            .collect())
    }

    /// Tools of every open source, in configuration order.
    ///
    /// Closed sessions, and sources that cannot list their tools, are left out.
    pub async fn collect_tools(&self) -> Vec<SourceTools> {
        let mut collected = Vec::new();
        for name in self.source_names().await {
            if self.get(&name).await.is_some_and(|s| s.state() == SessionState::Closed) {
                debug!(source = %name, "session closed, leaving its tools out");
                continue;
            }
            match self.list_tools(&name).await {
                Ok(tools) => collected.push(SourceTools { source: name, tools }),
                Err(err) => warn!(source = %name, error = %err, "failed to list tools, skipping source"),
            }
        }
        collected
    }

    /// Invoke a tool on a named source with that source's call timeout.
    pub async fn invoke(
        &self,
        source_name: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ParleyError> {
        let entry = self
            .entry(source_name)
            .await
            .map_err(|_| ParleyError::session_unavailable(source_name, "no such session"))?;
        let timeout = entry.descriptor.call_timeout().unwrap_or(self.timeouts.call);
        invoke(entry.session.as_ref(), tool_name, arguments, timeout).await
    }

    /// Close and forget one session.
    pub async fn close(&self, source_name: &str) -> Result<(), ParleyError> {
        let removed = {
            let mut entries = self.entries.write().await;
            entries
                .iter()
                .position(|e| e.descriptor.name == source_name)
                .map(|index| entries.remove(index))
        };
        match removed {
            Some(entry) => entry.session.close().await,
            None => Ok(()),
        }
    }

    /// Replace a session with a freshly opened one.
    ///
    /// Also retries sources that failed to open in [`open_all`](Self::open_all).
    pub async fn reconnect(&self, source_name: &str) -> Result<Arc<dyn ToolSession>, ParleyError> {
        let descriptor = match self.entry(source_name).await {
            Ok(entry) => entry.descriptor,
            Err(err) => self
                .failed
                .read()
                .await
                .iter()
                .find(|d| d.name == source_name)
                .cloned()
                .ok_or(err)?,
        };
        info!(source = source_name, "reconnecting tool source");
        self.open(&descriptor).await
    }

    /// Whether `source_name` was ever configured, opened or not.
    pub async fn is_known(&self, source_name: &str) -> bool {
        self.get(source_name).await.is_some()
            || self.failed.read().await.iter().any(|d| d.name == source_name)
    }

    /// Close every session, last opened first. Safe to call more than once.
    pub async fn shutdown(&self) {
        let entries = std::mem::take(&mut *self.entries.write().await);
        self.failed.write().await.clear();
        for entry in entries.iter().rev() {
            close_quietly(&entry.session).await;
        }
        if !entries.is_empty() {
            info!(count = entries.len(), "tool sessions closed");
        }
    }

    async fn entry(&self, source_name: &str) -> Result<SessionEntry, ParleyError> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.descriptor.name == source_name)
            .cloned()
            .ok_or_else(|| ParleyError::Configuration(format!("Unknown tool source '{source_name}'")))
    }
}

async fn close_quietly(session: &Arc<dyn ToolSession>) {
    if let Err(err) = session.close().await {
        warn!(source = session.source_name(), error = %err, "error while closing tool session");
    }
}

/// Connector used when no transport support is compiled in.
pub struct UnsupportedConnector;

#[async_trait]
impl SessionConnector for UnsupportedConnector {
    async fn connect(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<Arc<dyn ToolSession>, ParleyError> {
        Err(ParleyError::connection(
            &descriptor.name,
            "remote tool sources require the `mcp` feature",
        ))
    }
}
