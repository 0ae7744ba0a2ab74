//! Tool Trait and Registry
//!
//! Defines the unified `Tool` trait interface and `ToolRegistry` for
//! dynamic tool registration, lookup, and execution.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use taskloop_core::{CancellationScope, ToolParams};

use crate::executor::ToolResult;

/// Context provided to each tool during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Task the call belongs to
    pub task_id: String,
    /// Working directory relative paths resolve against
    pub cwd: PathBuf,
    /// Cancellation scope of the running task
    pub scope: CancellationScope,
}

impl ToolContext {
    pub fn new(
        task_id: impl Into<String>,
        cwd: impl Into<PathBuf>,
        scope: CancellationScope,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            cwd: cwd.into(),
            scope,
        }
    }

    /// Resolve a model-supplied path against the working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd.join(p)
        }
    }
}

/// Approval category of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    /// Reads the workspace
    Read,
    /// Modifies files
    Edit,
    /// Runs commands
    Execute,
    /// Talks to the user; handled by the task loop itself
    Interactive,
}

/// One parameter a tool accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl ToolParameter {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: false,
        }
    }
}

/// Name, description and parameters of a tool, as shown to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
    pub category: ToolCategory,
}

/// Unified tool interface.
///
/// Tools are registered in a `ToolRegistry` and dispatched dynamically.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool (e.g., "read_file")
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does
    fn description(&self) -> &str;

    /// Parameters the tool reads from the call
    fn parameters(&self) -> Vec<ToolParameter>;

    /// Approval category
    fn category(&self) -> ToolCategory;

    /// Execute the tool with the given context and parameters.
    async fn execute(&self, ctx: &ToolContext, params: &ToolParams) -> ToolResult;

    /// Release resources held across calls (terminals, child processes).
    async fn close(&self) -> Result<(), String> {
        Ok(())
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
            category: self.category(),
        }
    }
}

/// Fetch a required parameter or fail with a missing-parameter result.
pub fn required_param<'a>(params: &'a ToolParams, name: &str) -> Result<&'a str, ToolResult> {
    match params.get(name).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(crate::error::ToolError::missing_parameter(name).into()),
    }
}

/// Registry of available tools.
///
/// Provides O(1) lookup by name and deterministic iteration in
/// registration order.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Insertion order for deterministic iteration
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. If a tool with the same name already exists, it is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Specs of all tools in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.spec())
            .collect()
    }

    /// Get all registered tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name with the given context and parameters.
    ///
    /// Returns a resource-not-found result if the tool is not registered.
    pub async fn execute(&self, name: &str, ctx: &ToolContext, params: &ToolParams) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(ctx, params).await,
            None => ToolResult::err_kind(
                crate::error::ToolErrorKind::ResourceNotFound,
                format!("Unknown tool: {}", name),
            ),
        }
    }

    /// Close every tool, collecting failures instead of stopping at the first.
    pub async fn close_all(&self) -> Vec<(String, String)> {
        let mut failures = Vec::new();
        for name in &self.order {
            if let Some(tool) = self.tools.get(name) {
                if let Err(e) = tool.close().await {
                    failures.push((name.clone(), e));
                }
            }
        }
        failures
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
