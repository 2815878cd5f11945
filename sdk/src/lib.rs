//! Clio SDK
//!
//! Shared contracts for the Clio engine: the error taxonomy, the `Tool`
//! capability and the argument/schema types tools exchange with the model.

/// Error types and handling
pub mod errors;

/// The tool capability trait
pub mod tool;

/// Tool input and schema types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, EngineErrorExt};
pub use tool::Tool;
pub use types::{ToolError, ToolInput, ToolSchema};
