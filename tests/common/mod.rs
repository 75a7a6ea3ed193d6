//! Shared test helpers: scripted provider and in-memory tool sources.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use parley::config::{SourceDescriptor, SourceTransport};
use parley::error::ParleyError;
use parley::provider::{ModelProvider, ProviderRequest, ProviderResponse};
use parley::sessions::{RemoteToolSchema, SessionConnector, SessionState, ToolSession};
use parley::tools::{AgentTool, Tool, ToolExecutionContext, ToolParameters};
use parley::types::ToolCall;

/// A provider that replays queued responses and records every request.
pub struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    /// Once the queue is empty, keep answering with this.
    fallback: Mutex<Option<ProviderResponse>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            fallback: Mutex::new(None),
        }
    }

    pub fn queue_text(&self, text: &str) -> &Self {
        self.responses.lock().unwrap().push(ProviderResponse {
            text: text.to_string(),
            finish_reason: Some("stop".into()),
            ..Default::default()
        });
        self
    }

    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) -> &Self {
        self.queue_tool_calls(vec![ToolCall::new(id, name, args)])
    }

    pub fn queue_tool_calls(&self, calls: Vec<ToolCall>) -> &Self {
        self.responses.lock().unwrap().push(ProviderResponse {
            tool_calls: calls,
            finish_reason: Some("tool_calls".into()),
            ..Default::default()
        });
        self
    }

    /// Answer every request past the queue with the same tool call.
    pub fn always_call(&self, name: &str) -> &Self {
        *self.fallback.lock().unwrap() = Some(ProviderResponse {
            tool_calls: vec![ToolCall::new("loop", name, json!({}))],
            finish_reason: Some("tool_calls".into()),
            ..Default::default()
        });
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ParleyError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if !responses.is_empty() {
            return Ok(responses.remove(0));
        }
        self.fallback
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ParleyError::Provider {
                provider: "scripted".into(),
                message: "no queued response".into(),
            })
    }
}

/// A local tool that always answers with `reply`.
pub fn fixed_tool(name: &str, reply: &str) -> Arc<dyn Tool> {
    let reply = reply.to_string();
    Arc::new(AgentTool::new(
        name,
        format!("{name} for tests"),
        ToolParameters::empty(),
        move |_args, _ctx: ToolExecutionContext| {
            let reply = reply.clone();
            async move { Ok(serde_json::Value::String(reply)) }
        },
    ))
}

/// In-memory tool source. Tools are `<source>_<tool>` for each configured name.
///
/// Calling `drop_session` closes the transport; `fail` returns a protocol error.
pub struct InMemorySession {
    name: String,
    tools: Vec<String>,
    closed: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ToolSession for InMemorySession {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> SessionState {
        if self.closed.load(Ordering::SeqCst) {
            SessionState::Closed
        } else {
            SessionState::Open
        }
    }

    async fn list_tools(&self) -> Result<Vec<RemoteToolSchema>, ParleyError> {
        Ok(self
            .tools
            .iter()
            .map(|tool| RemoteToolSchema {
                name: tool.clone(),
                description: Some(format!("{tool} from {}", self.name)),
                input_schema: json!({"type": "object", "properties": {}}),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ParleyError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ParleyError::session_unavailable(&self.name, "transport closed"));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        match tool_name {
            "drop_session" => {
                self.closed.store(true, Ordering::SeqCst);
                Err(ParleyError::session_unavailable(&self.name, "transport closed"))
            }
            "fail" => Err(ParleyError::Provider {
                provider: "mcp".into(),
                message: "invalid params".into(),
            }),
            "slow" => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!("late"))
            }
            _ => Ok(json!({ "source": self.name, "tool": tool_name, "arguments": arguments })),
        }
    }

    async fn close(&self) -> Result<(), ParleyError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector backed by [`InMemorySession`]s, with sources that refuse to open.
#[derive(Default)]
pub struct InMemoryConnector {
    tools: HashMap<String, Vec<String>>,
    failing: Mutex<Vec<String>>,
    pub connects: AtomicUsize,
    sessions: Mutex<Vec<Arc<InMemorySession>>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, name: &str, tools: &[&str]) -> Self {
        self.tools
            .insert(name.to_string(), tools.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn failing(self, name: &str) -> Self {
        self.failing.lock().unwrap().push(name.to_string());
        self
    }

    /// Let a failing source open from now on.
    pub fn heal(&self, name: &str) {
        self.failing.lock().unwrap().retain(|n| n != name);
    }

    /// Most recent session opened for `name`.
    pub fn session(&self, name: &str) -> Option<Arc<InMemorySession>> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.name == name)
            .cloned()
    }
}

#[async_trait]
impl SessionConnector for InMemoryConnector {
    async fn connect(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<Arc<dyn ToolSession>, ParleyError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&descriptor.name) {
            return Err(ParleyError::connection(&descriptor.name, "connection refused"));
        }
        let session = Arc::new(InMemorySession {
            name: descriptor.name.clone(),
            tools: self.tools.get(&descriptor.name).cloned().unwrap_or_default(),
            closed: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        });
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

pub fn ws_source(name: &str) -> SourceDescriptor {
    SourceDescriptor::new(
        name,
        SourceTransport::Websocket {
            url: format!("ws://127.0.0.1/{name}"),
        },
    )
}
