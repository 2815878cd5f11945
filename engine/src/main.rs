// Clio coding assistant
// Main entry point for the clio binary

use clap::Parser;
use clio_engine::cli::{Cli, Command};
use clio_engine::config::Config;
use clio_engine::handlers::{
    handle_chat, handle_run, handle_setup, handle_stdio, handle_tools, handle_version,
    resolve_work_dir, OutputFormat,
};
use clio_engine::telemetry::{init_telemetry_with_level, init_telemetry_with_session_log};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let command = cli.command.take().unwrap_or(Command::Chat);

    // Commands that must work without a valid config
    match command {
        Command::Version => return handle_version(format),
        Command::Setup => {
            init_telemetry_with_level(cli.log.as_deref().unwrap_or("warn"));
            return handle_setup(cli.config.as_deref());
        }
        _ => {}
    }

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    if config.core.session_logs && matches!(
            command,
            Command::Chat | Command::Run { .. } | Command::Stdio { .. }
        ) {
        match init_telemetry_with_session_log(log_level, &config.logs_dir()) {
            Ok(path) => tracing::debug!("Session log at {}", path.display()),
            Err(e) => {
                init_telemetry_with_level(log_level);
                tracing::warn!("Session log disabled: {}", e);
            }
        }
    } else {
        init_telemetry_with_level(log_level);
    }

    tracing::info!(
        "Clio v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let work_dir = resolve_work_dir(cli.dir.as_deref())?;

    match command {
        Command::Chat => handle_chat(&config, work_dir).await,
        Command::Run { prompt, add, yes } => {
            tracing::info!("Running prompt: {}", prompt);
            handle_run(prompt, add, yes, &config, work_dir, format).await
        }
        Command::Stdio { yes } => handle_stdio(yes, &config, work_dir).await,
        Command::Tools => handle_tools(&config, work_dir, format),
        Command::Setup | Command::Version => Ok(()),
    }
}
