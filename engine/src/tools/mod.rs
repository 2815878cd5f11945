//! Tool Execution Engine
//!
//! Built-in tools and the registry the orchestrator dispatches through.

pub mod context;
pub mod escape;
pub mod filesystem;
pub mod terminal;
pub mod web;

pub use context::{ToolContext, ToolSettings};
pub use filesystem::{EditFileTool, ListDirectoryTool, ReadFileTool, WriteFileTool};
pub use terminal::{ExecuteShellTool, FindFilesTool, SearchTextTool};
pub use web::{WebFetchTool, WebSearchTool};

use std::sync::Arc;

use sdk::{EngineError, EngineErrorExt, Tool, ToolInput, ToolSchema};
use tracing::{debug, warn};

/// Registry of tools that can be dispatched by the agent.
///
/// Tools are kept in registration order, which is also the order their
/// schemas are advertised to the model.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry with no tools enabled.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The full built-in catalog bound to one session context.
    pub fn with_default_tools(ctx: Arc<ToolContext>) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ReadFileTool::new(Arc::clone(&ctx))));
        registry.register(Arc::new(WriteFileTool::new(Arc::clone(&ctx))));
        registry.register(Arc::new(EditFileTool::new(Arc::clone(&ctx))));
        registry.register(Arc::new(ListDirectoryTool::new(Arc::clone(&ctx))));
        registry.register(Arc::new(ExecuteShellTool::new(Arc::clone(&ctx))));
        registry.register(Arc::new(SearchTextTool::new(Arc::clone(&ctx))));
        registry.register(Arc::new(FindFilesTool::new(Arc::clone(&ctx))));
        registry.register(Arc::new(WebFetchTool::new(Arc::clone(&ctx))));
        registry.register(Arc::new(WebSearchTool::new(ctx)));
        registry
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => {
                warn!("Replacing already registered tool '{}'", tool.name());
                self.tools[i] = tool;
            }
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run a tool and surface any failure as an `EngineError`.
    pub async fn execute(&self, name: &str, arguments_json: &str) -> Result<String, EngineError> {
        let tool = self
            .get(name)
            .ok_or_else(|| EngineError::ToolNotFound(name.to_string()))?;
        let input = ToolInput::from_json(name, arguments_json)?;
        tool.execute(input).await
    }

    /// Dispatch a tool call by name, parsing arguments from JSON.
    ///
    /// Returns the tool output as a string. Errors are returned as
    /// `Error: <message>` so the model can see the error and self-correct.
    pub async fn dispatch(&self, name: &str, arguments_json: &str) -> String {
        debug!("Dispatching tool '{}' with args: {}", name, arguments_json);

        match self.execute(name, arguments_json).await {
            Ok(output) => output,
            Err(EngineError::ToolNotFound(_)) => {
                warn!("Unknown tool requested: {}", name);
                format!(
                    "Error: Unknown tool '{}'. Available tools: {}",
                    name,
                    self.names().join(", ")
                )
            }
            Err(e) if e.is_recoverable() => {
                debug!("Tool '{}' failed: {}", name, e);
                format!("Error: {}", e)
            }
            Err(e) => {
                warn!("Tool '{}' refused: {}", name, e);
                format!("Error: {}", e)
            }
        }
    }
}
