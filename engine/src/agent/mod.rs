//! Conversation Orchestrator
//!
//! Drives one user turn at a time through the model/tool loop: request,
//! execute every requested tool sequentially, append results, repeat until
//! the model answers in plain text or the iteration cap is hit.

pub mod core;
pub mod prompt;
pub mod working_memory;

pub use core::{AgentCore, ToolObserver, TurnResult, MAX_ITERATIONS};
pub use working_memory::WorkingMemory;
