//! Clio Engine Library
//!
//! This library provides the core functionality of the Clio assistant.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Token counting module
pub mod tokens;

/// Pinned-file context module
pub mod context;

/// File system security module
pub mod fs_guard;

/// Command execution security module
pub mod command_executor;

/// Confirmation gate for mutating operations
pub mod permission;

/// Built-in tools and the tool registry
pub mod tools;

/// External editor bridge
pub mod bridge;

/// LLM provider abstraction layer
pub mod llm;

/// Agent loop core module
pub mod agent;

/// Session wiring
pub mod session;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

/// JSON over stdin/stdout for editor extensions
pub mod stdio;
