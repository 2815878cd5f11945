//! Command handlers for CLI operations
//!
//! - chat: interactive session with slash commands and `@mentions`
//! - run: one prompt, one turn
//! - stdio: newline-delimited JSON session for editor extensions
//! - tools: dump the tool catalog
//! - setup: write the default configuration
//! - version: build information

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::EngineErrorExt;
use serde_json::json;
use tracing::{info, warn};

use crate::agent::ToolObserver;
use crate::config::Config;
use crate::permission::{AutoApprove, PermissionGate};
use crate::session::{AddOutcome, Session};
use crate::stdio::{self, StdioChannel, StdioObserver, StdioPermissionGate};
use crate::tools::{ToolContext, ToolRegistry};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Characters of a tool result echoed by `PrintObserver`
const OBSERVER_PREVIEW_CHARS: usize = 120;

/// Asks on the terminal before every gated operation.
pub struct StdinPermissionGate;

#[async_trait]
impl PermissionGate for StdinPermissionGate {
    async fn request(&self, operation: &str, details: &str) -> bool {
        eprint!("\n⚠ {}: {}\n  Allow? [y/N] ", operation, details);
        let _ = std::io::stderr().flush();

        match read_line().await {
            Ok(Some(answer)) => {
                let approved = is_yes(&answer);
                info!(
                    "Permission {} for {}",
                    if approved { "granted" } else { "denied" },
                    operation
                );
                approved
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to read permission answer: {}", e);
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Prints one line per executed tool.
pub struct PrintObserver;

#[async_trait]
impl ToolObserver for PrintObserver {
    async fn on_tool_executed(&self, name: &str, arguments: &str, result: &str) {
        println!("  → {} {}", name, one_line(arguments, OBSERVER_PREVIEW_CHARS));
        println!("    {}", one_line(result, OBSERVER_PREVIEW_CHARS));
    }
}

/// First line of `text`, cut to `max` characters.
fn one_line(text: &str, max: usize) -> String {
    let first = text.lines().next().unwrap_or_default();
    let mut out: String = first.chars().take(max).collect();
    if first.chars().count() > max || text.lines().nth(1).is_some() {
        out.push('…');
    }
    out
}

/// Read one line from stdin without blocking the runtime. `None` on EOF.
async fn read_line() -> std::io::Result<Option<String>> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Resolve `--dir`, defaulting to the process working directory.
pub fn resolve_work_dir(dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Working directory {} does not exist", dir.display()))?;
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }
    Ok(dir)
}

fn permission_gate(config: &Config, yes: bool) -> Arc<dyn PermissionGate> {
    if yes || config.security.auto_approve {
        Arc::new(AutoApprove)
    } else {
        Arc::new(StdinPermissionGate)
    }
}

/// Slash commands understood by the interactive session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Add(String),
    Remove(String),
    Files,
    Clear,
    /// List models, or switch by number or name
    Model(Option<String>),
    Config,
    Exit,
    Unknown(String),
}

impl SlashCommand {
    /// Parse a line starting with `/`. Other lines are not commands.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let rest = line.strip_prefix('/')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let cmd = match (name, arg) {
            ("help", _) => Self::Help,
            ("add", a) if !a.is_empty() => Self::Add(unquote(a).to_string()),
            ("remove", a) if !a.is_empty() => Self::Remove(unquote(a).to_string()),
            ("files", _) => Self::Files,
            ("clear", _) => Self::Clear,
            ("model", "") => Self::Model(None),
            ("model", a) => Self::Model(Some(a.to_string())),
            ("config", _) => Self::Config,
            ("exit" | "quit", _) => Self::Exit,
            _ => Self::Unknown(line.to_string()),
        };
        Some(cmd)
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

const HELP: &str = "Commands:
  /help            Show this help
  /add <path>      Add a file or folder to context
  /remove <path>   Remove a file from context
  /files           List files in context
  /clear           Clear conversation history
  /model [N|name]  List models or switch to another one
  /config          Show the loaded configuration
  /exit            Leave the session

Mention files inline with @path or @\"path with spaces\" to add them before the turn.";

fn print_add_outcome(label: &str, outcome: &std::result::Result<AddOutcome, sdk::EngineError>) {
    match outcome {
        Ok(AddOutcome::File { path, tokens }) => {
            println!("✓ Added {} ({} tokens)", path.display(), tokens)
        }
        Ok(AddOutcome::Folder(report)) => println!("✓ {}", report),
        Err(e) => println!("✗ {}: {} ({})", label, e, e.user_hint()),
    }
}

/// Resolve a `/model` argument: a 1-based index into `options` or a model name.
pub fn select_model(options: &[String], arg: &str) -> std::result::Result<String, String> {
    let arg = arg.trim();
    if let Ok(n) = arg.parse::<usize>() {
        return match n.checked_sub(1).and_then(|i| options.get(i)) {
            Some(model) => Ok(model.clone()),
            None => Err(format!("Invalid selection. Choose 1-{}", options.len())),
        };
    }
    if arg.is_empty() || arg.contains(char::is_whitespace) {
        return Err("Invalid input. Use a number like `/model 2` or a model name".to_string());
    }
    Ok(arg.to_string())
}

fn print_models(options: &[String], current: &str) {
    println!("Models:");
    for (i, model) in options.iter().enumerate() {
        let mark = if model == current { "●" } else { "○" };
        println!("  {} {}. {}", mark, i + 1, model);
    }
    println!("Switch with /model <number> or /model <name>.");
}

fn print_config(config: &Config, session: &Session) -> Result<()> {
    match &config.source {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none, built-in defaults)"),
    }
    println!("Active model: {}", session.agent.model());
    println!();
    let rendered =
        toml::to_string_pretty(&config.redacted()).context("Failed to render configuration")?;
    println!("{}", rendered.trim_end());
    Ok(())
}

fn print_files(session: &Session) {
    let context = &session.context;
    println!("History: {} tokens", session.history_tokens());
    if context.is_empty() {
        println!("No files in context");
        return;
    }
    println!(
        "Context ({} file(s), {}/{} tokens):",
        context.len(),
        context.total_tokens(),
        context.budget()
    );
    for entry in context.list() {
        let shown = entry
            .path
            .strip_prefix(session.work_dir())
            .unwrap_or(&entry.path);
        println!("  {:>8}  {}", entry.token_count, shown.display());
    }
}

/// Interactive session
pub async fn handle_chat(config: &Config, work_dir: PathBuf) -> Result<()> {
    let gate = permission_gate(config, false);
    let mut session = Session::from_config(config, work_dir, gate, Some(Arc::new(PrintObserver)))
        .context("Failed to start session")?;

    println!(
        "Clio v{} (model {}) in {}",
        env!("CARGO_PKG_VERSION"),
        session.agent.model(),
        session.work_dir().display()
    );
    println!("Type /help for commands, /exit to quit.");

    let bridge = Arc::clone(&session.bridge);
    tokio::spawn(async move {
        if bridge.connect().await {
            info!(
                "Editor bridge connected to {}",
                bridge.ide_name().unwrap_or_else(|| "editor".to_string())
            );
        }
    });

    loop {
        print!("\n> ");
        let _ = std::io::stdout().flush();

        let Some(line) = read_line().await.context("Failed to read input")? else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(cmd) = SlashCommand::parse(input) {
            match cmd {
                SlashCommand::Help => println!("{}", HELP),
                SlashCommand::Add(path) => {
                    let outcome = session.add_path(&path).await;
                    print_add_outcome(&path, &outcome);
                }
                SlashCommand::Remove(path) => match session.context.remove(&path) {
                    Ok(entry) => println!(
                        "✓ Removed {} ({} tokens)",
                        entry.path.display(),
                        entry.token_count
                    ),
                    Err(e) => println!("✗ {}", e),
                },
                SlashCommand::Files => print_files(&session),
                SlashCommand::Clear => {
                    session.agent.clear_history();
                    println!("✓ Conversation history cleared");
                }
                SlashCommand::Model(arg) => {
                    let options = config.llm.model_options(session.agent.model());
                    match arg {
                        None => print_models(&options, session.agent.model()),
                        Some(arg) => match select_model(&options, &arg) {
                            Ok(model) => {
                                session.agent.set_model(model);
                                println!("✓ Switched to {}", session.agent.model());
                            }
                            Err(message) => println!("✗ {}", message),
                        },
                    }
                }
                SlashCommand::Config => {
                    if let Err(e) = print_config(config, &session) {
                        println!("✗ {:#}", e);
                    }
                }
                SlashCommand::Exit => break,
                SlashCommand::Unknown(cmd) => {
                    println!("Unknown command: {} (try /help)", cmd)
                }
            }
            continue;
        }

        for (mention, outcome) in session.resolve_mentions(input).await {
            print_add_outcome(&format!("@{}", mention), &outcome);
        }

        match session.run_turn(input).await {
            Ok(result) => {
                println!("\n{}", result.answer);
                println!(
                    "\n({} iteration(s), {} tool call(s), {} tokens, history {} tokens)",
                    result.iterations,
                    result.tool_calls,
                    result.usage.total_tokens,
                    session.history_tokens()
                );
            }
            Err(e) => println!("\n✗ {}\n  {}", e, e.user_hint()),
        }
    }

    session.close().await;
    println!("Goodbye.");
    Ok(())
}

/// Run a single prompt and print the answer
pub async fn handle_run(
    prompt: String,
    add: Vec<String>,
    yes: bool,
    config: &Config,
    work_dir: PathBuf,
    format: OutputFormat,
) -> Result<()> {
    let gate = permission_gate(config, yes);
    let observer: Option<Arc<dyn ToolObserver>> = match format {
        OutputFormat::Text => Some(Arc::new(PrintObserver)),
        OutputFormat::Json => None,
    };
    let mut session = Session::from_config(config, work_dir, gate, observer)
        .context("Failed to start session")?;

    session.bridge.connect().await;

    for path in &add {
        let outcome = session.add_path(path).await;
        if let OutputFormat::Text = format {
            print_add_outcome(path, &outcome);
        }
        outcome.with_context(|| format!("Failed to add {} to context", path))?;
    }
    for (mention, outcome) in session.resolve_mentions(&prompt).await {
        if let OutputFormat::Text = format {
            print_add_outcome(&format!("@{}", mention), &outcome);
        }
    }

    let result = session.run_turn(&prompt).await;
    let history_tokens = session.history_tokens();
    session.close().await;

    match result {
        Ok(turn) => {
            match format {
                OutputFormat::Text => {
                    println!("{}", turn.answer);
                    println!();
                    println!("✓ Completed");
                    println!("  Iterations: {}", turn.iterations);
                    println!("  Tool calls: {}", turn.tool_calls);
                    println!("  Tokens: {}", turn.usage.total_tokens);
                    println!("  History: {} tokens", history_tokens);
                }
                OutputFormat::Json => {
                    let output = json!({
                        "status": "completed",
                        "answer": turn.answer,
                        "iterations": turn.iterations,
                        "tool_calls": turn.tool_calls,
                        "usage": turn.usage,
                        "history_tokens": history_tokens,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            Ok(())
        }
        Err(e) => {
            match format {
                OutputFormat::Text => println!("✗ Turn failed: {}", e),
                OutputFormat::Json => {
                    let output = json!({
                        "status": "failed",
                        "error": e.to_string(),
                        "hint": e.user_hint(),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            Err(e.into())
        }
    }
}

/// Editor session over stdin/stdout
///
/// Permission requests travel over the same pipes unless `--yes` or
/// `security.auto_approve` is set.
pub async fn handle_stdio(yes: bool, config: &Config, work_dir: PathBuf) -> Result<()> {
    let channel = Arc::new(StdioChannel::stdio());
    let gate: Arc<dyn PermissionGate> = if yes || config.security.auto_approve {
        Arc::new(AutoApprove)
    } else {
        Arc::new(StdioPermissionGate::new(Arc::clone(&channel)))
    };
    let observer: Arc<dyn ToolObserver> = Arc::new(StdioObserver::new(Arc::clone(&channel)));
    let mut session = Session::from_config(config, work_dir, gate, Some(observer))
        .context("Failed to start session")?;

    session.bridge.connect().await;

    let served = stdio::serve(&channel, &mut session).await;
    session.close().await;
    served.context("stdio channel failed")
}

/// Print every tool schema in the form sent to the model
pub fn handle_tools(config: &Config, work_dir: PathBuf, format: OutputFormat) -> Result<()> {
    let ctx = ToolContext::from_config(config, work_dir, Arc::new(AutoApprove), None)
        .context("Failed to build tool context")?;
    let registry = ToolRegistry::with_default_tools(Arc::new(ctx));

    match format {
        OutputFormat::Text => {
            println!("Tools ({}):", registry.len());
            println!();
            for schema in registry.schemas() {
                println!("  {:<16} {}", schema.name, schema.description);
            }
        }
        OutputFormat::Json => {
            let tools: Vec<_> = registry
                .schemas()
                .iter()
                .map(|s| s.to_function_tool())
                .collect();
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
    }
    Ok(())
}

/// Write the default configuration unless one already exists
pub fn handle_setup(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => Config::default_config_path()?,
    };

    if path.exists() {
        let config = Config::load_from_path(&path)
            .with_context(|| format!("Existing config at {} is invalid", path.display()))?;
        println!("✓ Configuration already exists at {}", path.display());
        println!("  Model: {} via {}", config.llm.model, config.llm.base_url);
        return Ok(());
    }

    let config = Config::create_default(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("✓ Wrote default configuration to {}", path.display());
    println!("  Model: {} via {}", config.llm.model, config.llm.base_url);
    println!(
        "  Set {} or llm.api_key before starting a session.",
        config.llm.api_key_env
    );
    Ok(())
}

pub fn handle_version(format: OutputFormat) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    match format {
        OutputFormat::Text => println!("clio {} ({} {})", version, commit, timestamp),
        OutputFormat::Json => {
            let output = json!({
                "version": version,
                "commit": commit,
                "built": timestamp,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
