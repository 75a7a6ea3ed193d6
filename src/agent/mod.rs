//! Agent runtime: the inbound entry point.

pub mod runtime;

pub use runtime::{AgentRuntime, RuntimeOptions};
