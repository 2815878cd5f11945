use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use sdk::errors::EngineError;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default wall-clock limit for a shell command
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Captured output beyond this many characters is cut
const MAX_OUTPUT_CHARS: usize = 30_000;

/// Destructive command fragments, written as a human would type them.
///
/// Matching compares against the command with all whitespace removed and
/// lowercased, so `rm  -RF   /` and `rm -rf /` are the same command.
const DANGEROUS_PATTERNS: &[&str] = &[
    // Recursive deletes of root, home and friends
    "rm -rf /",
    "rm -rf /*",
    "rm -fr /",
    "rm -rf ~",
    "rm -rf $HOME",
    "rm -rf --no-preserve-root",
    // Raw block devices and filesystem formatting
    "> /dev/sd",
    "> /dev/nvme",
    "of=/dev/sd",
    "of=/dev/nvme",
    "dd if=",
    "mkfs",
    "shred /dev/",
    // Fork bomb
    ":(){ :|:& };:",
    // Credential files
    "/etc/passwd",
    "/etc/shadow",
    "/etc/sudoers",
    // Permission broadcasts
    "chmod -R 777 /",
    "chmod 777 /",
];

static PIPE_TO_SHELL: OnceLock<Regex> = OnceLock::new();

fn pipe_to_shell() -> &'static Regex {
    // Runs on the stripped, lowercased command
    PIPE_TO_SHELL.get_or_init(|| {
        Regex::new(r"(curl|wget)[^|]*\|(sudo)?(ba|z|da|k)?sh\b").expect("Invalid pipe pattern")
    })
}

/// Captured result of a finished shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Text handed back to the model.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();

        if !self.stdout.trim().is_empty() {
            parts.push(format!("Output:\n{}", truncate(self.stdout.trim_end())));
        }
        if !self.stderr.trim().is_empty() {
            parts.push(format!("Error:\n{}", truncate(self.stderr.trim_end())));
        }
        match self.exit_code {
            Some(0) => {}
            Some(code) => parts.push(format!("Exit code: {}", code)),
            None => parts.push("Exit code: terminated by signal".to_string()),
        }

        if parts.is_empty() {
            "Command completed successfully".to_string()
        } else {
            parts.join("\n\n")
        }
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_OUTPUT_CHARS) {
        Some((cut, _)) => format!(
            "{}\n... (output truncated, {} more bytes)",
            &text[..cut],
            text.len() - cut
        ),
        None => text.to_string(),
    }
}

/// CommandExecutor screens shell commands for destructive patterns and runs
/// the survivors in a subshell under a hard timeout.
///
/// # Security Features
/// - Fixed dangerous-pattern list, whitespace and case insensitive
/// - Download-piped-to-shell detection
/// - stdin set to null, stdout/stderr piped
/// - Child killed when the timeout elapses
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
    patterns: Vec<(&'static str, String)>,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl CommandExecutor {
    /// Creates a new CommandExecutor with the given default timeout.
    pub fn new(timeout: Duration) -> Self {
        let patterns = DANGEROUS_PATTERNS
            .iter()
            .map(|p| (*p, squash(p)))
            .collect();
        Self { timeout, patterns }
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Checks a command against the dangerous pattern list.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Blocked` naming the matched pattern.
    pub fn validate(&self, command: &str) -> Result<(), EngineError> {
        let squashed = squash(command);

        if let Some((label, _)) = self
            .patterns
            .iter()
            .find(|(_, needle)| squashed.contains(needle.as_str()))
        {
            warn!("Blocked dangerous command (pattern '{}'): {}", label, command);
            return Err(EngineError::Blocked((*label).to_string()));
        }

        if pipe_to_shell().is_match(&squashed) {
            warn!("Blocked download piped to shell: {}", command);
            return Err(EngineError::Blocked("download piped to shell".to_string()));
        }

        Ok(())
    }

    /// Runs `command` through `sh -c` in `work_dir`.
    ///
    /// The command is validated again before spawning. When the timeout
    /// elapses the child is killed and `EngineError::Timeout` is returned.
    pub async fn run(
        &self,
        command: &str,
        work_dir: &Path,
        timeout: Option<Duration>,
    ) -> Result<ShellOutput, EngineError> {
        self.validate(command)?;

        let timeout = timeout.unwrap_or(self.timeout);
        info!("Executing shell command: {}", command);

        let child = shell(command)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Command timed out after {}s: {}",
                    timeout.as_secs(),
                    command
                );
                return Err(EngineError::Timeout(timeout.as_secs()));
            }
        };

        let result = ShellOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        debug!("Command finished with {:?}", result.exit_code);
        Ok(result)
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

fn squash(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Quote a single argument for `sh`.
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}
