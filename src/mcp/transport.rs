//! MCP transport layer.
//!
//! Each transport spawns or dials its connection and runs the MCP handshake,
//! yielding an initialized rmcp service.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::model::ClientInfo;
use rmcp::service::{RoleClient, RxJsonRpcMessage, ServiceExt, TxJsonRpcMessage};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use tokio::process::Command;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use crate::config::{SourceTransport, TransportKind};
use crate::error::ParleyError;

use super::client::{map_client_initialize_error, MCPRunningService};

/// Opens an initialized MCP service over one transport family.
#[async_trait]
pub trait MCPTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Connect and complete the handshake. Errors are `Connection` errors
    /// naming `source_name`.
    async fn connect(
        &self,
        source_name: &str,
        client_info: ClientInfo,
    ) -> Result<MCPRunningService, ParleyError>;
}

/// Build the transport for a configured source.
pub fn transport_for(transport: &SourceTransport) -> Box<dyn MCPTransport> {
    match transport {
        SourceTransport::Stdio { command, args, env } => Box::new(StdioTransport {
            command: command.clone(),
            args: args.clone(),
            env: env.clone(),
        }),
        SourceTransport::Websocket { url } => Box::new(WebSocketTransport { url: url.clone() }),
        SourceTransport::StreamableHttp { url, headers } => Box::new(StreamableHttpTransport {
            url: url.clone(),
            headers: headers.clone(),
        }),
    }
}

/// Local subprocess speaking MCP over stdin/stdout.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl StdioTransport {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl MCPTransport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn connect(
        &self,
        source_name: &str,
        client_info: ClientInfo,
    ) -> Result<MCPRunningService, ParleyError> {
        let mut command = Command::new(&self.command);
        command.args(&self.args).envs(&self.env).kill_on_drop(true);
        let transport = TokioChildProcess::new(command).map_err(|error| {
            ParleyError::connection(source_name, format!("spawn '{}': {error}", self.command))
        })?;

        client_info
            .into_dyn()
            .serve(transport)
            .await
            .map_err(|e| map_client_initialize_error(source_name, e))
    }
}

/// MCP over the streamable HTTP transport.
pub struct StreamableHttpTransport {
    url: String,
    headers: HashMap<String, String>,
}

impl StreamableHttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    fn default_headers(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                map.insert(name, value);
            }
        }
        map
    }
}

#[async_trait]
impl MCPTransport for StreamableHttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::StreamableHttp
    }

    async fn connect(
        &self,
        source_name: &str,
        client_info: ClientInfo,
    ) -> Result<MCPRunningService, ParleyError> {
        let client = reqwest::Client::builder()
            .default_headers(self.default_headers())
            .build()
            .map_err(|error| ParleyError::connection(source_name, format!("http client: {error}")))?;
        let transport = StreamableHttpClientTransport::with_client(
            client,
            StreamableHttpClientTransportConfig::with_uri(self.url.clone()),
        );

        client_info
            .into_dyn()
            .serve(transport)
            .await
            .map_err(|e| map_client_initialize_error(source_name, e))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WsTransportError {
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid JSON-RPC frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// MCP JSON-RPC frames over a websocket, one message per text frame.
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl MCPTransport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }

    async fn connect(
        &self,
        source_name: &str,
        client_info: ClientInfo,
    ) -> Result<MCPRunningService, ParleyError> {
        let (socket, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|error| {
                ParleyError::connection(source_name, WsTransportError::from(error).to_string())
            })?;
        let (sink, stream) = socket.split();

        let sink = Box::pin(sink.sink_map_err(WsTransportError::from).with(
            |message: TxJsonRpcMessage<RoleClient>| async move {
                Ok::<_, WsTransportError>(Message::Text(serde_json::to_string(&message)?.into()))
            },
        ));
        let source = source_name.to_string();
        let stream = Box::pin(
            stream
                .take_while(|frame| {
                    let open = matches!(frame, Ok(frame) if !frame.is_close());
                    async move { open }
                })
                .filter_map(move |frame| {
                    let message = frame.ok().and_then(|frame| decode_frame(&source, frame));
                    async move { message }
                }),
        );

        client_info
            .into_dyn()
            .serve((sink, stream))
            .await
            .map_err(|e| map_client_initialize_error(source_name, e))
    }
}

/// Parse one WebSocket frame as a JSON-RPC message.
///
/// Control frames yield nothing. Data frames that do not parse are logged and dropped.
fn decode_frame(source_name: &str, frame: Message) -> Option<RxJsonRpcMessage<RoleClient>> {
    let parsed = match &frame {
        Message::Text(text) => serde_json::from_str(text.as_str()),
        Message::Binary(bytes) => serde_json::from_slice(bytes),
        _ => return None,
    };
    match parsed {
        Ok(message) => Some(message),
        Err(error) => {
            warn!(
                source = source_name,
                %error,
                bytes = frame.len(),
                "dropping websocket frame that is not a JSON-RPC message"
            );
            None
        }
    }
}
