//! Configuration management
//!
//! This module handles loading, validation, and management of the Clio configuration.
//! Configuration is stored in TOML format at ~/.clio/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory, session logs
//! - **llm**: OpenAI-compatible endpoint, model and API key lookup
//! - **context**: Token budget and tokenizer encoding
//! - **tools**: Shell and web tool limits
//! - **security**: Auto-approval and extra protected paths
//! - **bridge**: External editor discovery and timeouts
//!
//! Every field has a default, so a partial file (or an empty one) is valid.
//!
//! # Path Expansion
//!
//! `~` is expanded to the user's home directory for `data_dir`,
//! `bridge.lock_file` and every `security.extra_protected_paths` entry.
//!
//! # Examples
//!
//! ```no_run
//! use clio_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Model: {}", config.llm.model);
//! println!("Token budget: {}", config.context.token_budget);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::tokens::SUPPORTED_ENCODINGS;

const REDACTED: &str = "********";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Model provider
    #[serde(default)]
    pub llm: LlmConfig,

    /// Context assembler
    #[serde(default)]
    pub context: ContextConfig,

    /// Tool limits
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Safety settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// External editor bridge
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// File this configuration was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Write a JSON session log under `<data_dir>/logs`
    #[serde(default = "default_true")]
    pub session_logs: bool,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the chat completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Models offered by `/model`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Inline API key, takes priority over `api_key_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Extra HTTP headers sent with every request
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Context assembler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum total tokens across all context files
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Tokenizer encoding (cl100k_base, o200k_base)
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

/// Tool limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default execute_shell timeout in seconds
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,

    /// web_fetch / web_search timeout in seconds
    #[serde(default = "default_web_timeout")]
    pub web_timeout_secs: u64,

    /// Characters of page text returned by web_fetch
    #[serde(default = "default_max_fetch_chars")]
    pub max_fetch_chars: usize,

    /// HTML search endpoint used by web_search
    #[serde(default = "default_search_url")]
    pub search_url: String,
}

/// Security configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Approve every mutating tool without asking
    #[serde(default)]
    pub auto_approve: bool,

    /// Additional directories that may never be written
    #[serde(default)]
    pub extra_protected_paths: Vec<PathBuf>,
}

/// External editor bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Try to connect to an editor at startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Environment variable carrying the editor port
    #[serde(default = "default_port_env")]
    pub port_env: String,

    /// Lock file with `{"port": N}` (supports ~ expansion)
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,

    /// Seconds to wait for the `connected` reply
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Seconds to wait for a diff decision
    #[serde(default = "default_diff_timeout")]
    pub diff_timeout_secs: u64,

    /// Show overwrites of existing files as a full diff before writing
    #[serde(default)]
    pub review_writes: bool,
}

// Default value functions
fn default_log_level() -> String {
    "warn".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.clio")
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_token_budget() -> usize {
    crate::context::DEFAULT_TOKEN_BUDGET
}

fn default_encoding() -> String {
    "cl100k_base".to_string()
}

fn default_shell_timeout() -> u64 {
    crate::command_executor::DEFAULT_TIMEOUT_SECS
}

fn default_web_timeout() -> u64 {
    crate::tools::context::DEFAULT_WEB_TIMEOUT_SECS
}

fn default_max_fetch_chars() -> usize {
    crate::tools::context::DEFAULT_MAX_FETCH_CHARS
}

fn default_search_url() -> String {
    crate::tools::context::DEFAULT_SEARCH_URL.to_string()
}

fn default_port_env() -> String {
    "CLIO_IDE_PORT".to_string()
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("~/.clio/ide/bridge.json")
}

fn default_handshake_timeout() -> u64 {
    5
}

fn default_diff_timeout() -> u64 {
    30
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            session_logs: true,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            models: Vec::new(),
            api_key_env: default_api_key_env(),
            api_key: None,
            timeout_secs: default_llm_timeout(),
            headers: HashMap::new(),
        }
    }
}

impl LlmConfig {
    /// Models `/model` can switch between, `current` first when unlisted.
    pub fn model_options(&self, current: &str) -> Vec<String> {
        let mut options = self.models.clone();
        if !options.iter().any(|m| m == current) {
            options.insert(0, current.to_string());
        }
        options
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            encoding: default_encoding(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: default_shell_timeout(),
            web_timeout_secs: default_web_timeout(),
            max_fetch_chars: default_max_fetch_chars(),
            search_url: default_search_url(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port_env: default_port_env(),
            lock_file: default_lock_file(),
            handshake_timeout_secs: default_handshake_timeout(),
            diff_timeout_secs: default_diff_timeout(),
            review_writes: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.clio/config.toml)
    ///
    /// If the configuration file doesn't exist, writes a default one first.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;
        config.source = Some(path.to_path_buf());

        Ok(config)
    }

    /// Write the default configuration to `path` and return it processed
    ///
    /// Paths are written unexpanded (`~/.clio`) so the file stays portable.
    pub fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the default configuration file path (~/.clio/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".clio").join("config.toml"))
    }

    /// Copy safe to print: the inline API key and header values are masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.llm.api_key.is_some() {
            config.llm.api_key = Some(REDACTED.to_string());
        }
        for value in config.llm.headers.values_mut() {
            *value = REDACTED.to_string();
        }
        config
    }

    /// Directory for session log files
    pub fn logs_dir(&self) -> PathBuf {
        self.core.data_dir.join("logs")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level, encoding, budget, base URL and timeouts
    /// - Expands ~ in paths
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` describing the first invalid field.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if !SUPPORTED_ENCODINGS.contains(&self.context.encoding.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid encoding '{}'. Must be one of: {}",
                self.context.encoding,
                SUPPORTED_ENCODINGS.join(", ")
            )));
        }

        if self.context.token_budget == 0 {
            return Err(EngineError::Config(
                "context.token_budget must be greater than 0".to_string(),
            ));
        }

        let base_url = self.llm.base_url.trim();
        if base_url.is_empty() || !base_url.starts_with("http") {
            return Err(EngineError::Config(format!(
                "Invalid llm.base_url '{}'. Must be an http(s) URL",
                self.llm.base_url
            )));
        }

        let timeouts = [
            ("llm.timeout_secs", self.llm.timeout_secs),
            ("tools.shell_timeout_secs", self.tools.shell_timeout_secs),
            ("tools.web_timeout_secs", self.tools.web_timeout_secs),
            ("bridge.handshake_timeout_secs", self.bridge.handshake_timeout_secs),
            ("bridge.diff_timeout_secs", self.bridge.diff_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(EngineError::Config(format!("{} must be greater than 0", name)));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.bridge.lock_file = expand_path(&self.bridge.lock_file)?;
        self.security.extra_protected_paths = self
            .security
            .extra_protected_paths
            .iter()
            .map(|p| expand_path(p))
            .collect::<Result<_, _>>()?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
