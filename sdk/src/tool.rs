//! The `Tool` capability implemented by every model-callable tool.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::EngineError;
use crate::types::{ToolInput, ToolSchema};

/// A named, schema-described operation the model can invoke.
///
/// Implementations decode their own typed arguments from [`ToolInput`] and
/// return plain text on success. Errors are rendered to text by the registry,
/// so a failing tool never aborts the conversation.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use sdk::{EngineError, Tool, ToolInput};
/// use serde_json::{json, Value};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Tool for Echo {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     fn description(&self) -> &str {
///         "Echo the text argument back"
///     }
///
///     fn parameters(&self) -> Value {
///         json!({
///             "type": "object",
///             "properties": {"text": {"type": "string"}},
///             "required": ["text"]
///         })
///     }
///
///     async fn execute(&self, input: ToolInput) -> Result<String, EngineError> {
///         Ok(input.param_str("text")?)
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to call this tool
    fn name(&self) -> &str;

    /// One-paragraph description shown to the model
    fn description(&self) -> &str;

    /// JSON-Schema object describing the arguments
    fn parameters(&self) -> Value;

    /// Full descriptor supplied to the provider
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), self.description(), self.parameters())
    }

    /// Run the tool
    async fn execute(&self, input: ToolInput) -> Result<String, EngineError>;
}
