//! Remote tool source descriptors.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;

/// Transport used to reach a tool source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SourceTransport {
    /// Local subprocess speaking over stdin/stdout.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Persistent socket stream.
    Websocket { url: String },
    /// HTTP long-lived stream.
    StreamableHttp {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    Websocket,
    StreamableHttp,
}

impl SourceTransport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::Websocket { .. } => TransportKind::Websocket,
            Self::StreamableHttp { .. } => TransportKind::StreamableHttp,
        }
    }
}

/// One `[[sources]]` entry.
///
/// ```toml
/// [[sources]]
/// name = "math"
/// transport = "stdio"
/// command = "python"
/// args = ["math_server.py"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub transport: SourceTransport,
    /// Open a new session for every call instead of keeping one.
    #[serde(default)]
    pub per_call: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout_secs: Option<u64>,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, transport: SourceTransport) -> Self {
        Self {
            name: name.into(),
            transport,
            per_call: false,
            call_timeout_secs: None,
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }
}
