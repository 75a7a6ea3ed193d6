//! Parley: a conversational agent runtime.
//!
//! A user message goes through a tool-augmented decide → act → observe loop:
//! the model either answers or asks for tools, tools run (locally or on remote
//! MCP sources), results are fed back, and the final answer is returned with
//! intent flags. Conversation memory is kept per thread.
//!
//! # Quick Start
//!
//! ```no_run
//! use parley::prelude::*;
//!
//! # async fn example() -> parley::error::Result<()> {
//! let config = AppConfig::load(Some("parley.toml".as_ref()))?;
//! let runtime = AgentRuntime::start(config).await?;
//! let reply = runtime
//!     .handle(InboundMessage::new("What time is it?").on_thread("t1"))
//!     .await?;
//! println!("{}", reply.response);
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod error;
pub mod intent;
pub mod memory;
pub mod prelude;
pub mod provider;
pub mod sessions;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "mcp")]
pub mod mcp;

#[cfg(feature = "cli")]
pub mod cli;
