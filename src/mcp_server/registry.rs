//! Tool registry: the set of tools this server advertises and dispatches.
//!
//! Registration happens once, synchronously, before the worker starts
//! serving; afterwards the registry is only read.

use std::collections::HashMap;

use super::types::McpToolDefinition;
use crate::tools::VideoTool;

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// Registered tools, keyed by name, with registration order preserved for
/// `tools/list`.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, VideoTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every video tool.
    pub fn with_video_tools() -> Self {
        let mut registry = Self::new();
        for tool in VideoTool::ALL {
            registry.register(tool);
        }
        registry
    }

    /// Register a tool. Re-registering a name replaces the entry in place.
    pub fn register(&mut self, tool: VideoTool) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<VideoTool> {
        self.tools.get(name).copied()
    }

    /// Tool definitions in registration order.
    pub fn definitions(&self) -> Vec<McpToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| McpToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
