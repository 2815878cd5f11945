//! Telemetry and Observability
//!
//! Handles setting up `tracing-subscriber` for structured logging.
//! Supports config-driven log levels, environment variable overrides,
//! format switching between pretty (debug) and JSON (release), and an
//! optional per-session JSON log file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Crates whose debug events go to the session log
const SESSION_TARGETS: &[&str] = &["clio_engine", "clio"];

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "warn"
///
/// In debug builds: pretty-printed output on stderr.
/// In release builds: JSON structured output with spans on stderr.
pub fn init_telemetry_with_level(log_level: &str) {
    init(log_level, None);
}

/// Like [`init_telemetry_with_level`], plus a JSON session log in `logs_dir`.
///
/// The session log records engine events at `debug` regardless of the
/// terminal level. Returns the log file path.
pub fn init_telemetry_with_session_log(log_level: &str, logs_dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(logs_dir)?;
    let path = session_log_path(logs_dir, Local::now());
    let file = File::create(&path)?;
    init(log_level, Some(file));
    Ok(path)
}

/// `<logs_dir>/session_<YYYYmmdd_HHMMSS>.log`
pub fn session_log_path(logs_dir: &Path, started: DateTime<Local>) -> PathBuf {
    logs_dir.join(format!("session_{}.log", started.format("%Y%m%d_%H%M%S")))
}

fn init(log_level: &str, session_file: Option<File>) {
    let level = if log_level.trim().is_empty() {
        "warn"
    } else {
        log_level
    };
    let default_filter = format!("{},clio_engine={},clio={}", level, level, level);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let session_layer = session_file.map(|file| {
        let targets = SESSION_TARGETS
            .iter()
            .fold(Targets::new(), |t, target| t.with_target(*target, Level::DEBUG));
        fmt::layer()
            .json()
            .with_writer(Mutex::new(file))
            .with_filter(targets)
    });

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter),
            )
            .with(session_layer)
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter),
            )
            .with(session_layer)
            .try_init()
            .ok();
    }
}
