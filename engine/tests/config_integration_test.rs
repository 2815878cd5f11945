//! Integration tests for configuration management
//!
//! These tests verify that a config file is loaded, validated and expanded,
//! and that its values reach the components built from it.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use clio_engine::bridge::BridgeSettings;
use clio_engine::config::Config;
use clio_engine::permission::AutoApprove;
use clio_engine::tools::ToolContext;
use sdk::errors::EngineError;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_full_config_file() {
    let temp = TempDir::new().unwrap();
    let vault = temp.path().join("vault");
    let path = write_config(
        &temp,
        &format!(
            r#"
[core]
log_level = "debug"
data_dir = "~/.clio-test"
session_logs = false

[llm]
base_url = "http://localhost:11434/v1"
model = "qwen2.5-coder"
api_key_env = "LOCAL_KEY"
timeout_secs = 300

[llm.headers]
"X-Org" = "acme"

[context]
token_budget = 5000
encoding = "o200k_base"

[tools]
shell_timeout_secs = 90
web_timeout_secs = 7
max_fetch_chars = 1234
search_url = "http://localhost:9999/search"

[security]
auto_approve = true
extra_protected_paths = ["{}", "~/secrets"]

[bridge]
enabled = false
port_env = "MY_IDE_PORT"
lock_file = "~/.clio-test/ide.json"
handshake_timeout_secs = 2
diff_timeout_secs = 15
review_writes = true
"#,
            vault.display()
        ),
    );

    let config = Config::load_from_path(&path).unwrap();
    let home = dirs::home_dir().unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.core.data_dir, home.join(".clio-test"));
    assert!(!config.core.session_logs);
    assert_eq!(config.logs_dir(), home.join(".clio-test/logs"));

    assert_eq!(config.llm.model, "qwen2.5-coder");
    assert_eq!(config.llm.headers.get("X-Org").map(String::as_str), Some("acme"));
    assert_eq!(config.context.encoding, "o200k_base");
    assert_eq!(config.context.token_budget, 5000);
    assert!(config.security.auto_approve);
    assert_eq!(
        config.security.extra_protected_paths,
        vec![vault.clone(), home.join("secrets")]
    );

    let bridge = BridgeSettings::from_config(&config.bridge);
    assert_eq!(bridge.port_env, "MY_IDE_PORT");
    assert_eq!(bridge.lock_file, home.join(".clio-test/ide.json"));
    assert_eq!(bridge.handshake_timeout, Duration::from_secs(2));
    assert_eq!(bridge.diff_timeout, Duration::from_secs(15));

    let ctx = ToolContext::from_config(&config, temp.path(), Arc::new(AutoApprove), None).unwrap();
    assert_eq!(ctx.executor.default_timeout(), Duration::from_secs(90));
    assert_eq!(ctx.settings.web_timeout, Duration::from_secs(7));
    assert_eq!(ctx.settings.max_fetch_chars, 1234);
    assert_eq!(ctx.settings.search_url, "http://localhost:9999/search");
    assert!(ctx.settings.review_writes);
    assert!(matches!(
        ctx.guard.check_writable(&vault.join("key.pem")),
        Err(EngineError::ProtectedPath { .. })
    ));
    assert!(ctx.guard.check_writable(&temp.path().join("ok.txt")).is_ok());
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        ("[core]\nlog_level = \"loud\"\n", "log level"),
        ("[context]\nencoding = \"p50k_base\"\n", "encoding"),
        ("[context]\ntoken_budget = 0\n", "token_budget"),
        ("[llm]\nbase_url = \"ftp://example.com\"\n", "base_url"),
        ("[bridge]\ndiff_timeout_secs = 0\n", "bridge.diff_timeout_secs"),
        ("[tools]\nshell_timeout_secs = 0\n", "tools.shell_timeout_secs"),
    ];

    for (content, needle) in cases {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp, content);
        match Config::load_from_path(&path) {
            Err(EngineError::Config(msg)) => assert!(msg.contains(needle), "{}: {}", needle, msg),
            other => panic!("expected config error for {}, got {:?}", needle, other.map(|_| ())),
        }
    }
}

#[test]
fn test_malformed_toml_and_missing_file() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "[core\nlog_level = ");
    assert!(matches!(
        Config::load_from_path(&path),
        Err(EngineError::Config(_))
    ));

    assert!(Config::load_from_path(&temp.path().join("absent.toml")).is_err());
}

#[test]
fn test_default_file_round_trips() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("fresh/config.toml");

    let created = Config::create_default(&path).unwrap();
    let loaded = Config::load_from_path(&path).unwrap();

    assert_eq!(created.llm.model, loaded.llm.model);
    assert_eq!(created.context.token_budget, loaded.context.token_budget);
    assert_eq!(created.bridge.lock_file, loaded.bridge.lock_file);

    // The file keeps the portable ~ form
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("~/.clio"));
    let value: toml::Value = toml::from_str(&raw).unwrap();
    assert!(value.get("bridge").is_some());
    assert!(value.get("security").is_some());
}
