//! Error types and handling
//!
//! This module provides the error taxonomy shared by the Clio engine and its
//! tools. All errors implement the `EngineErrorExt` trait which provides
//! operator-facing hints and indicates whether errors are recoverable.
//!
//! # Propagation
//!
//! Tool-level variants (`NotFound`, `TextNotFound`, `Blocked`, ...) are
//! rendered into tool result strings so the model can self-correct. Turn-level
//! variants (`Transport`, `MalformedResponse`, `EmptyModelResponse`,
//! `MaxIterationsReached`) abort the current turn and reach the operator.

use std::path::PathBuf;
use thiserror::Error;

/// Trait for Clio error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait EngineErrorExt {
    /// Returns a short hint suitable for showing to the operator
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be worked around by the model or by retrying
    /// with different input. Non-recoverable errors need operator action.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, EngineErrorExt};
/// use std::path::PathBuf;
///
/// let error = EngineError::NotFound(PathBuf::from("missing.txt"));
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let blocked = EngineError::Blocked("rm -rf /".to_string());
/// assert!(!blocked.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // File system errors
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Cannot read {} as text (binary file?)", .0.display())]
    UnreadableBinary(PathBuf),

    // Context errors
    #[error("Token budget exceeded: adding {requested} tokens to {current} would exceed the budget of {budget}")]
    BudgetExceeded {
        requested: usize,
        current: usize,
        budget: usize,
    },

    #[error("Not in context: {0}")]
    NotInContext(String),

    // Safety errors
    #[error("Access denied: {} is inside protected system path {}", .path.display(), .prefix.display())]
    ProtectedPath { path: PathBuf, prefix: PathBuf },

    #[error("Command blocked: matches dangerous pattern '{0}'")]
    Blocked(String),

    #[error("Permission denied by user: {0}")]
    PermissionDenied(String),

    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    // Edit errors
    #[error("Text not found in {}: {preview}", .path.display())]
    TextNotFound { path: PathBuf, preview: String },

    // Tool errors
    #[error("Unknown tool '{0}'")]
    ToolNotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    // Network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // Turn errors
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Model returned an empty response (finish reason: {0})")]
    EmptyModelResponse(String),

    #[error("Reached the maximum of {0} iterations without a final answer")]
    MaxIterationsReached(usize),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::NotFound(_) => "Check the path and try again",
            Self::NotAFile(_) => "Use a folder command to add directories",
            Self::NotADirectory(_) => "Expected a directory path",
            Self::UnreadableBinary(_) => "Only text files can be read",

            Self::BudgetExceeded { .. } => "Remove some files from context or raise token_budget",
            Self::NotInContext(_) => "Use /files to see what is in context",

            Self::ProtectedPath { .. } => "System directories cannot be modified",
            Self::Blocked(_) => "This command must be run manually outside the assistant",
            Self::PermissionDenied(_) => "The operation was declined",
            Self::Timeout(_) => "Try a faster command or a larger timeout",

            Self::TextNotFound { .. } => "Re-read the file and retry with the exact text",

            Self::ToolNotFound(_) => "The requested tool is not available",
            Self::InvalidArguments(_) => "Check the tool arguments",

            Self::Http(_) => "The remote server returned an error",
            Self::Transport(_) => "Model provider unreachable. Check base_url, API key and network",
            Self::MalformedResponse(_) => "The model provider returned an unexpected response",
            Self::EmptyModelResponse(_) => "The model returned nothing. Try rephrasing",
            Self::MaxIterationsReached(_) => {
                "Task too complex. Try breaking it into smaller steps"
            }

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Need the operator, not a retry
            Self::Config(_)
            | Self::ProtectedPath { .. }
            | Self::Blocked(_)
            | Self::PermissionDenied(_) => false,

            _ => true,
        }
    }
}
