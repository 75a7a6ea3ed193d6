#![cfg(feature = "mcp")]

mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use common::ScriptedProvider;
use parley::agent::{AgentRuntime, RuntimeOptions};
use parley::config::{SourceDescriptor, SourceTransport};
use parley::mcp::McpConnector;
use parley::sessions::{SessionConnector, SessionState, ToolSession};
use parley::types::InboundMessage;
use serde_json::json;
use tokio::time::timeout;
use wiremock::matchers::{header, method, path};
use wiremock::Request;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mcp_tools_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string"
            }
        }
    })
}

fn mock_mcp_http_handler(
    server_name: &'static str,
    tools: &'static [(&'static str, &'static str)],
) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync {
    move |request: &Request| {
        let body: serde_json::Value = request.body_json().unwrap_or_else(|_| json!({}));
        let method = body.get("method").and_then(|value| value.as_str()).unwrap_or_default();
        let id = body.get("id").cloned().unwrap_or_else(|| json!(1));

        match method {
            "initialize" => ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": {
                        "name": server_name,
                        "version": "0.1.0"
                    }
                }
            })),
            "tools/list" => {
                let tool_definitions: Vec<_> = tools
                    .iter()
                    .map(|(tool_name, description)| {
                        json!({
                            "name": tool_name,
                            "description": description,
                            "inputSchema": mcp_tools_schema()
                        })
                    })
                    .collect();
                ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "tools": tool_definitions,
                        "nextCursor": null
                    }
                }))
            }
            "tools/call" => {
                let called_tool = body
                    .get("params")
                    .and_then(|params| params.get("name"))
                    .and_then(|name| name.as_str())
                    .unwrap_or_default();
                let arguments = body
                    .get("params")
                    .and_then(|params| params.get("arguments"))
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                let failed = called_tool == "broken";
                ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [{ "type": "text", "text": format!("{server_name}:{called_tool}") }],
                        "structuredContent": {
                            "server": server_name,
                            "tool": called_tool,
                            "arguments": arguments
                        },
                        "isError": failed
                    }
                }))
            }
            "notifications/initialized" => ResponseTemplate::new(202),
            _ => ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": null
            })),
        }
    }
}

fn request_methods(requests: &[Request]) -> HashSet<String> {
    requests
        .iter()
        .filter_map(|request| {
            request
                .body_json::<serde_json::Value>()
                .ok()
                .and_then(|body| {
                    body.get("method")
                        .and_then(|method| method.as_str())
                        .map(str::to_string)
                })
        })
        .collect()
}

fn http_source(name: &str, server: &MockServer, headers: &[(&str, &str)]) -> SourceDescriptor {
    SourceDescriptor::new(
        name,
        SourceTransport::StreamableHttp {
            url: format!("{}/mcp", server.uri()),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        },
    )
}

#[tokio::test]
async fn streamable_http_session_lists_and_calls_tools() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(mock_mcp_http_handler(
            "weather",
            &[("get_forecast", "Forecast for a city"), ("broken", "Always fails")],
        ))
        .mount(&server)
        .await;

    let connector = McpConnector::new();
    let session = timeout(
        Duration::from_secs(5),
        connector.connect(&http_source("weather", &server, &[("x-parley-scope", "qa")])),
    )
    .await
    .expect("connect should complete before timeout")
    .expect("session should open");
    assert_eq!(session.source_name(), "weather");
    assert_eq!(session.state(), SessionState::Open);

    let tools = session.list_tools().await.expect("tools/list should succeed");
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["get_forecast", "broken"]);
    assert_eq!(tools[0].input_schema["properties"]["query"]["type"], "string");

    let output = session
        .call_tool("get_forecast", json!({ "query": "Oslo" }))
        .await
        .expect("tools/call should succeed");
    assert_eq!(
        output,
        json!({
            "server": "weather",
            "tool": "get_forecast",
            "arguments": { "query": "Oslo" }
        })
    );

    let err = session
        .call_tool("broken", json!({}))
        .await
        .expect_err("error result should fail");
    assert!(!err.aborts_run());

    let requests = server.received_requests().await.expect("requests recorded");
    let methods = request_methods(&requests);
    assert!(methods.contains("initialize"));
    assert!(methods.contains("tools/list"));
    assert!(methods.contains("tools/call"));
    assert!(requests.iter().all(|request| {
        request
            .headers
            .get("x-parley-scope")
            .and_then(|value| value.to_str().ok())
            == Some("qa")
    }));

    session.close().await.expect("close");
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn runtime_aggregates_two_http_sources_and_skips_a_dead_one() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("x-server", "math"))
        .respond_with(mock_mcp_http_handler("math", &[("add", "Add two numbers")]))
        .mount(&server_a)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("x-server", "weather"))
        .respond_with(mock_mcp_http_handler(
            "weather",
            &[("get_forecast", "Forecast"), ("add", "Shadowed add")],
        ))
        .mount(&server_b)
        .await;

    let provider = Arc::new(ScriptedProvider::new());
    provider
        .queue_tool_call("c1", "get_forecast", json!({ "query": "Lima" }))
        .queue_text("Sunny in Lima.");

    let options = RuntimeOptions::builder()
        .provider(provider)
        .sources(vec![
            http_source("math", &server_a, &[("x-server", "math")]),
            SourceDescriptor::new(
                "notion",
                SourceTransport::Stdio {
                    command: "/nonexistent/parley-notion".into(),
                    args: Vec::new(),
                    env: HashMap::new(),
                },
            ),
            http_source("weather", &server_b, &[("x-server", "weather")]),
        ])
        .build();
    let runtime = timeout(Duration::from_secs(10), AgentRuntime::from_options(options))
        .await
        .expect("startup should complete before timeout")
        .expect("runtime should start");

    let tools = runtime.tools().await;
    assert_eq!(tools.names(), vec!["add", "get_forecast"]);
    assert_eq!(tools.dropped().len(), 1);

    let health = runtime.health().await;
    assert!(health[0].is_ready());
    assert!(health[1].error.as_deref().is_some_and(|e| e.contains("notion")));
    assert!(health[2].is_ready());

    let response = runtime
        .handle(InboundMessage::new("Weather in Lima?").on_thread("w1"))
        .await
        .expect("run should succeed");
    assert_eq!(response.response, "Sunny in Lima.");
    assert_eq!(response.tools.as_deref(), Some("get_forecast"));

    runtime.shutdown().await;
}
