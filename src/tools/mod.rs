//! Tool system: the `Tool` trait, local and remote tools, and the registry.

pub mod arguments;
pub mod builtin;
pub mod dynamic;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use dynamic::RemoteTool;
pub use registry::{SourceTools, ToolDefinition, ToolOrigin, ToolRegistry, ToolSpec};
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::ToolParameters;
