//! MCP client over an initialized rmcp service.

use rmcp::{
    model::{CallToolRequestParams, CallToolResult, Content, JsonObject, ResourceContents},
    service::{ClientInitializeError, DynService, RoleClient, RunningService, ServiceError},
};
use tracing::debug;

use crate::error::ParleyError;
use crate::sessions::RemoteToolSchema;

type DynClientService = Box<dyn DynService<RoleClient>>;
pub type MCPRunningService = RunningService<RoleClient, DynClientService>;

#[derive(Debug, Clone)]
pub struct MCPToolCallResult {
    pub structured_content: Option<serde_json::Value>,
    pub text_content: Option<String>,
    pub content: Vec<serde_json::Value>,
}

impl MCPToolCallResult {
    pub fn into_value_or_text(self) -> serde_json::Value {
        if let Some(structured) = self.structured_content {
            return structured;
        }
        if let Some(text) = self.text_content {
            return serde_json::Value::String(text);
        }
        serde_json::Value::Array(self.content)
    }
}

/// Client for one Model Context Protocol server.
pub struct MCPClient {
    source_name: String,
    service: MCPRunningService,
}

impl MCPClient {
    /// Wrap a running service; the handshake is already done by `serve(...)`.
    pub fn from_running_service(source_name: impl Into<String>, service: MCPRunningService) -> Self {
        Self {
            source_name: source_name.into(),
            service,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn is_closed(&self) -> bool {
        self.service.is_closed()
    }

    /// List available tools, falling back to a single page for servers
    /// that reject paginated listing.
    pub async fn list_tools(&self) -> Result<Vec<RemoteToolSchema>, ParleyError> {
        let tools = match self.service.list_all_tools().await {
            Ok(tools) => tools,
            Err(ServiceError::UnexpectedResponse) => {
                let page = self
                    .service
                    .list_tools(None)
                    .await
                    .map_err(|e| map_service_error(&self.source_name, "list_tools", e))?;
                page.tools
            }
            Err(e) => return Err(map_service_error(&self.source_name, "list_tools", e)),
        };

        Ok(tools.into_iter().map(map_mcp_tool_schema).collect())
    }

    /// Execute a tool on the server.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<MCPToolCallResult, ParleyError> {
        let arguments = coerce_tool_arguments(arguments)?;

        let result = self
            .service
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|e| map_service_error(&self.source_name, "call_tool", e))?;

        map_call_result(name, result)
    }

    /// Cancel the service and release the transport.
    pub async fn close(self) -> Result<(), ParleyError> {
        let source_name = self.source_name;
        match self.service.cancel().await {
            Ok(reason) => {
                debug!(source = %source_name, ?reason, "MCP service stopped");
                Ok(())
            }
            Err(e) => Err(ParleyError::InvalidState(format!(
                "MCP service for '{source_name}' did not stop cleanly: {e}"
            ))),
        }
    }
}

fn map_mcp_tool_schema(tool: rmcp::model::Tool) -> RemoteToolSchema {
    RemoteToolSchema {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()),
        input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
    }
}

fn coerce_tool_arguments(value: serde_json::Value) -> Result<Option<JsonObject>, ParleyError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let parsed: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
                ParleyError::InvalidArgument(format!("MCP tool arguments must be valid JSON: {e}"))
            })?;
            coerce_tool_arguments(parsed)
        }
        other => Err(ParleyError::InvalidArgument(format!(
            "MCP tool arguments must be a JSON object; got {other}"
        ))),
    }
}

fn extract_text_content(content: &[Content]) -> Option<String> {
    let mut lines = Vec::new();
    for item in content {
        if let Some(text) = item.as_text() {
            lines.push(text.text.clone());
            continue;
        }
        if let Some(resource) = item.as_resource() {
            if let ResourceContents::TextResourceContents { text, .. } = &resource.resource {
                lines.push(text.clone());
            }
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn map_call_result(name: &str, result: CallToolResult) -> Result<MCPToolCallResult, ParleyError> {
    let text_content = extract_text_content(&result.content);
    let content = result
        .content
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect::<Vec<_>>();

    if result.is_error.unwrap_or(false) {
        let message = result
            .structured_content
            .as_ref()
            .map(|v| v.to_string())
            .or_else(|| text_content.clone())
            .unwrap_or_else(|| "MCP tool returned an error result".into());

        return Err(ParleyError::tool(name, message));
    }

    Ok(MCPToolCallResult {
        structured_content: result.structured_content,
        text_content,
        content,
    })
}

pub(crate) fn map_client_initialize_error(source_name: &str, error: ClientInitializeError) -> ParleyError {
    let message = match error {
        ClientInitializeError::ConnectionClosed(context) => {
            format!("initialize connection closed: {context}")
        }
        ClientInitializeError::TransportError { error, context } => {
            format!("initialize transport error ({context}): {error}")
        }
        ClientInitializeError::JsonRpcError(error) => format!(
            "initialize JSON-RPC error {}: {}",
            error.code.0, error.message
        ),
        ClientInitializeError::Cancelled => "initialize cancelled".into(),
        other => format!("initialize error: {other}"),
    };
    ParleyError::connection(source_name, message)
}

/// Transport loss means the session is gone; everything else is per-call.
fn map_service_error(source_name: &str, context: &str, error: ServiceError) -> ParleyError {
    match error {
        ServiceError::McpError(error) => ParleyError::Provider {
            provider: "mcp".into(),
            message: format!("{context}: MCP error {}: {}", error.code.0, error.message),
        },
        ServiceError::TransportSend(error) => ParleyError::session_unavailable(
            source_name,
            format!("{context}: transport send failed: {error}"),
        ),
        ServiceError::TransportClosed => {
            ParleyError::session_unavailable(source_name, format!("{context}: transport closed"))
        }
        ServiceError::UnexpectedResponse => ParleyError::Provider {
            provider: "mcp".into(),
            message: format!("{context}: unexpected MCP response"),
        },
        ServiceError::Cancelled { reason } => {
            let suffix = reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            ParleyError::session_unavailable(
                source_name,
                format!("{context}: request cancelled{suffix}"),
            )
        }
        ServiceError::Timeout { timeout } => ParleyError::Timeout(timeout.as_millis() as u64),
        other => ParleyError::Provider {
            provider: "mcp".into(),
            message: format!("{context}: MCP service error: {other}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn coerce_tool_arguments_accepts_object_and_stringified_object() {
        let from_obj = coerce_tool_arguments(json!({"a": 3}))
            .expect("object arguments should parse")
            .expect("object should be present");
        assert_eq!(from_obj.get("a"), Some(&json!(3)));

        let from_str = coerce_tool_arguments(json!(r#"{"b":4}"#))
            .expect("stringified object should parse")
            .expect("object should be present");
        assert_eq!(from_str.get("b"), Some(&json!(4)));

        assert!(coerce_tool_arguments(json!(null)).expect("null").is_none());
        assert!(coerce_tool_arguments(json!("  ")).expect("blank").is_none());
    }

    #[test]
    fn coerce_tool_arguments_rejects_non_object() {
        let err =
            coerce_tool_arguments(json!(["bad"])).expect_err("array arguments should be rejected");
        assert!(matches!(err, ParleyError::InvalidArgument(_)));
    }

    #[test]
    fn coerce_tool_arguments_rejects_malformed_json_string() {
        let err = coerce_tool_arguments(json!(r#"{"a":3"#))
            .expect_err("malformed JSON string should be rejected");
        assert!(
            matches!(err, ParleyError::InvalidArgument(message) if message.contains("valid JSON"))
        );
    }

    #[test]
    fn map_mcp_tool_schema_copies_fields() {
        let mut schema = serde_json::Map::new();
        schema.insert("type".into(), json!("object"));
        let tool = rmcp::model::Tool::new("add", "add two numbers", schema);

        let mapped = map_mcp_tool_schema(tool);
        assert_eq!(mapped.name, "add");
        assert_eq!(mapped.description.as_deref(), Some("add two numbers"));
        assert_eq!(mapped.input_schema["type"], "object");
    }

    #[test]
    fn transport_closed_maps_to_session_unavailable() {
        let err = map_service_error("math", "call_tool", ServiceError::TransportClosed);
        assert!(err.aborts_run());
        assert!(matches!(
            err,
            ParleyError::SessionUnavailable { source_name, .. } if source_name == "math"
        ));
    }

    #[test]
    fn protocol_violation_maps_to_provider_error() {
        let err = map_service_error("math", "list_tools", ServiceError::UnexpectedResponse);
        assert!(!err.aborts_run());
        assert!(matches!(
            err,
            ParleyError::Provider { provider, message }
            if provider == "mcp" && message.contains("unexpected MCP response")
        ));
    }

    #[test]
    fn service_timeout_maps_to_timeout_error() {
        let err = map_service_error(
            "math",
            "call_tool",
            ServiceError::Timeout {
                timeout: Duration::from_millis(2750),
            },
        );
        assert!(matches!(err, ParleyError::Timeout(2750)));
    }

    #[test]
    fn initialize_error_maps_to_connection_error() {
        let init_error = ClientInitializeError::JsonRpcError(
            rmcp::model::ErrorData::invalid_request("bad initialize payload", None),
        );
        let err = map_client_initialize_error("math", init_error);
        assert!(matches!(
            err,
            ParleyError::Connection { source_name, message }
            if source_name == "math"
                && message.contains("JSON-RPC error")
                && message.contains("bad initialize payload")
        ));
    }

    #[test]
    fn error_payload_maps_to_tool_execution_error() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "division by zero" }
            ],
            "isError": true
        }))
        .expect("fixture call result should deserialize");

        let err = map_call_result("divide", result)
            .expect_err("error result should map to tool execution error");
        assert!(matches!(
            err,
            ParleyError::ToolExecution { tool_name, message }
            if tool_name == "divide" && message.contains("division by zero")
        ));
    }

    #[test]
    fn text_content_is_joined_for_plain_results() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "7" }
            ]
        }))
        .expect("fixture call result should deserialize");

        let mapped = map_call_result("add", result).expect("success");
        assert_eq!(mapped.into_value_or_text(), json!("7"));
    }
}
