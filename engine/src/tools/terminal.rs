//! Shell tools
//!
//! `execute_shell` runs a command through `CommandExecutor` under a hard
//! timeout. `search_text` and `find_files` build `grep` / `find` command
//! lines and take the exact same route: pattern filter, permission gate,
//! timed subshell.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sdk::{EngineError, Tool, ToolInput};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::context::ToolContext;
use crate::command_executor::{shell_quote, ShellOutput};

/// Filter, gate, run.
async fn run_gated(
    ctx: &ToolContext,
    operation: &str,
    command: &str,
    timeout: Option<Duration>,
) -> Result<ShellOutput, EngineError> {
    ctx.executor.validate(command)?;
    ctx.request_permission(operation, &format!("Run: {}", command))
        .await?;
    ctx.executor.run(command, &ctx.work_dir, timeout).await
}

// ---------------------------------------------------------------------------
// execute_shell
// ---------------------------------------------------------------------------

pub struct ExecuteShellTool {
    ctx: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct ExecuteShellArgs {
    command: String,
    /// Seconds
    #[serde(default)]
    timeout: Option<u64>,
}

impl ExecuteShellTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ExecuteShellTool {
    fn name(&self) -> &str {
        "execute_shell"
    }

    fn description(&self) -> &str {
        "Run a shell command in the working directory and return stdout, stderr and the exit code."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to run"},
                "timeout": {
                    "type": "integer",
                    "description": format!(
                        "Timeout in seconds (default {})",
                        self.ctx.executor.default_timeout().as_secs()
                    )
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<String, EngineError> {
        let args: ExecuteShellArgs = input.parse()?;
        if args.command.trim().is_empty() {
            return Err(EngineError::InvalidArguments("command must not be empty".into()));
        }

        let timeout = match args.timeout {
            Some(0) => None,
            other => other.map(Duration::from_secs),
        };
        let output = run_gated(&self.ctx, "execute_shell", &args.command, timeout).await?;
        Ok(output.render())
    }
}

// ---------------------------------------------------------------------------
// search_text
// ---------------------------------------------------------------------------

pub struct SearchTextTool {
    ctx: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct SearchTextArgs {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
    /// File name glob, e.g. `*.rs`
    #[serde(default)]
    filter: Option<String>,
}

fn default_path() -> String {
    ".".to_string()
}

impl SearchTextTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

/// `grep` command line for a recursive, line-numbered text search.
pub fn search_command(pattern: &str, path: &str, filter: Option<&str>) -> String {
    let mut cmd = String::from("grep -rnI");
    if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
        cmd.push_str(&format!(" --include={}", shell_quote(filter)));
    }
    cmd.push_str(&format!(" -e {} {}", shell_quote(pattern), shell_quote(path)));
    cmd
}

#[async_trait]
impl Tool for SearchTextTool {
    fn name(&self) -> &str {
        "search_text"
    }

    fn description(&self) -> &str {
        "Search file contents recursively for a regular expression. Returns matching lines as path:line:text."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regular expression to search for"},
                "path": {"type": "string", "description": "Directory or file to search (default: working directory)"},
                "filter": {"type": "string", "description": "Only search files matching this glob, e.g. *.rs"}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<String, EngineError> {
        let args: SearchTextArgs = input.parse()?;
        let command = search_command(&args.pattern, &args.path, args.filter.as_deref());
        debug!("search_text -> {}", command);

        let output = run_gated(&self.ctx, "search_text", &command, None).await?;
        // grep exits 1 when nothing matched
        if output.exit_code == Some(1) && output.stdout.trim().is_empty() && output.stderr.trim().is_empty() {
            return Ok(format!("No matches found for '{}'", args.pattern));
        }
        Ok(output.render())
    }
}

// ---------------------------------------------------------------------------
// find_files
// ---------------------------------------------------------------------------

pub struct FindFilesTool {
    ctx: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct FindFilesArgs {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
}

impl FindFilesTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

/// `find` command line for files whose name matches `pattern`.
pub fn find_command(pattern: &str, path: &str) -> String {
    format!(
        "find {} -type f -name {}",
        shell_quote(path),
        shell_quote(pattern)
    )
}

#[async_trait]
impl Tool for FindFilesTool {
    fn name(&self) -> &str {
        "find_files"
    }

    fn description(&self) -> &str {
        "Find files by name pattern (shell glob such as *.toml) under a directory."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "File name glob, e.g. *.rs"},
                "path": {"type": "string", "description": "Directory to search (default: working directory)"}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: ToolInput) -> Result<String, EngineError> {
        let args: FindFilesArgs = input.parse()?;
        let command = find_command(&args.pattern, &args.path);
        debug!("find_files -> {}", command);

        let output = run_gated(&self.ctx, "find_files", &command, None).await?;
        if output.success() && output.stdout.trim().is_empty() {
            return Ok(format!("No files found matching '{}'", args.pattern));
        }
        Ok(output.render())
    }
}
