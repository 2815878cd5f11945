//! CLI interface for Clio
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Clio coding assistant
///
/// Lets a language model read, edit and run code in your working directory,
/// optionally mirroring proposed edits into a connected editor.
#[derive(Parser, Debug)]
#[command(name = "clio")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Working directory for tools and context (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive session (default)
    Chat,

    /// Run a single prompt and print the answer
    Run {
        /// The prompt to send
        prompt: String,

        /// Add a file or folder to context before the turn
        #[arg(short, long = "add", value_name = "PATH")]
        add: Vec<String>,

        /// Approve every tool operation without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Serve newline-delimited JSON on stdin/stdout for an editor extension
    Stdio {
        /// Approve every tool operation without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the tool catalog as JSON schemas
    Tools,

    /// Write the default configuration file
    Setup,

    /// Show version and build information
    Version,
}

impl Cli {
    /// The subcommand, defaulting to `chat`
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Chat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_chat() {
        let cli = Cli::parse_from(["clio"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.command(), Command::Chat));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
        assert!(cli.dir.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["clio", "--log", "debug", "--dir", "/tmp/work", "tools"]);
        assert_eq!(cli.log, Some("debug".to_string()));
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/work")));
        assert!(matches!(cli.command(), Command::Tools));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from([
            "clio",
            "run",
            "explain main.rs",
            "--add",
            "src/main.rs",
            "-a",
            "docs",
            "--yes",
        ]);
        if let Some(Command::Run { prompt, add, yes }) = cli.command {
            assert_eq!(prompt, "explain main.rs");
            assert_eq!(add, vec!["src/main.rs", "docs"]);
            assert!(yes);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_stdio_command() {
        let cli = Cli::parse_from(["clio", "--dir", "/tmp/work", "stdio"]);
        assert!(matches!(cli.command(), Command::Stdio { yes: false }));

        let cli = Cli::parse_from(["clio", "stdio", "-y"]);
        assert!(matches!(cli.command(), Command::Stdio { yes: true }));
    }

    #[test]
    fn test_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["clio", "setup", "--config", "/tmp/clio.toml"]);
        assert!(matches!(cli.command(), Command::Setup));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/clio.toml")));
    }
}
