//! Model Context Protocol (MCP) tool sources.

pub mod client;
pub mod session;
pub mod transport;

pub use client::{MCPClient, MCPToolCallResult};
pub use session::{McpConnector, McpSession};
pub use transport::{transport_for, MCPTransport};
