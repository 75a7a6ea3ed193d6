//! Merged, name-indexed view of every tool the model may call.
//!
//! Merge order is fixed: local tools first, then each remote source in
//! configuration order. When two tools share a name the first one wins and
//! the later one is dropped and recorded.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use super::tool::Tool;
use super::types::ToolParameters;

/// Where a tool comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum ToolOrigin {
    Local,
    Remote(String),
}

impl std::fmt::Display for ToolOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote(source) => write!(f, "remote:{source}"),
        }
    }
}

/// Provider-facing description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool plus its origin; the handle is what gets invoked.
#[derive(Clone)]
pub struct ToolDefinition {
    origin: ToolOrigin,
    handle: Arc<dyn Tool>,
}

impl ToolDefinition {
    pub fn new(origin: ToolOrigin, handle: Arc<dyn Tool>) -> Self {
        Self { origin, handle }
    }

    pub fn local(handle: Arc<dyn Tool>) -> Self {
        Self::new(ToolOrigin::Local, handle)
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn description(&self) -> &str {
        self.handle.description()
    }

    pub fn parameters(&self) -> &ToolParameters {
        self.handle.parameters()
    }

    pub fn origin(&self) -> &ToolOrigin {
        &self.origin
    }

    pub fn handle(&self) -> &Arc<dyn Tool> {
        &self.handle
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters().schema.clone(),
        }
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name())
            .field("origin", &self.origin)
            .finish()
    }
}

/// Tools reported by one remote source.
#[derive(Debug, Clone)]
pub struct SourceTools {
    pub source: String,
    pub tools: Vec<ToolDefinition>,
}

/// A tool left out because an earlier one had the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedTool {
    pub name: String,
    pub origin: ToolOrigin,
    pub shadowed_by: ToolOrigin,
}

/// Immutable snapshot of available tools.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
    dropped: Vec<DroppedTool>,
}

impl ToolRegistry {
    pub fn build(local_tools: Vec<Arc<dyn Tool>>, sources: Vec<SourceTools>) -> Self {
        let mut registry = Self::default();
        for tool in local_tools {
            registry.insert(ToolDefinition::local(tool));
        }
        for source in sources {
            for tool in source.tools {
                registry.insert(tool);
            }
        }
        registry
    }

    fn insert(&mut self, definition: ToolDefinition) {
        if let Some(&existing) = self.index.get(definition.name()) {
            let shadowed_by = self.tools[existing].origin.clone();
            warn!(
                tool = definition.name(),
                dropped = %definition.origin,
                kept = %shadowed_by,
                "duplicate tool name, keeping first registration"
            );
            self.dropped.push(DroppedTool {
                name: definition.name().to_string(),
                origin: definition.origin,
                shadowed_by,
            });
            return;
        }
        self.index
            .insert(definition.name().to_string(), self.tools.len());
        self.tools.push(definition);
    }

    pub fn resolve(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// All tools, in merge order.
    pub fn all(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(ToolDefinition::spec).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(ToolDefinition::name).collect()
    }

    pub fn dropped(&self) -> &[DroppedTool] {
        &self.dropped
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
