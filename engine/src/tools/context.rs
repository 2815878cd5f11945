//! Per-session handle shared by every built-in tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sdk::errors::EngineError;
use tracing::{debug, warn};

use crate::bridge::BridgeSession;
use crate::command_executor::CommandExecutor;
use crate::config::Config;
use crate::fs_guard::{self, FileSystemGuard};
use crate::permission::{AutoApprove, PermissionGate};

pub const DEFAULT_WEB_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MAX_FETCH_CHARS: usize = 20_000;
pub const DEFAULT_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";

#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub web_timeout: Duration,
    pub max_fetch_chars: usize,
    pub search_url: String,
    /// Route overwrites of existing files through the editor's diff view.
    pub review_writes: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            web_timeout: Duration::from_secs(DEFAULT_WEB_TIMEOUT_SECS),
            max_fetch_chars: DEFAULT_MAX_FETCH_CHARS,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            review_writes: false,
        }
    }
}

impl ToolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            web_timeout: Duration::from_secs(config.tools.web_timeout_secs),
            max_fetch_chars: config.tools.max_fetch_chars,
            search_url: config.tools.search_url.clone(),
            review_writes: config.bridge.review_writes,
        }
    }
}

/// Everything a tool needs to act on the machine.
///
/// Built once per session and shared behind an `Arc`; nothing here is global.
pub struct ToolContext {
    pub work_dir: PathBuf,
    pub guard: FileSystemGuard,
    pub executor: CommandExecutor,
    pub permission: Arc<dyn PermissionGate>,
    pub bridge: Option<Arc<BridgeSession>>,
    pub http: reqwest::Client,
    pub settings: ToolSettings,
}

impl ToolContext {
    /// A context with default guard, executor and settings that approves everything.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            guard: FileSystemGuard::new(),
            executor: CommandExecutor::default(),
            permission: Arc::new(AutoApprove),
            bridge: None,
            http: reqwest::Client::new(),
            settings: ToolSettings::default(),
        }
    }

    pub fn from_config(
        config: &Config,
        work_dir: impl Into<PathBuf>,
        permission: Arc<dyn PermissionGate>,
        bridge: Option<Arc<BridgeSession>>,
    ) -> Result<Self, EngineError> {
        let settings = ToolSettings::from_config(config);
        let http = build_http_client(settings.web_timeout)?;
        Ok(Self {
            work_dir: work_dir.into(),
            guard: FileSystemGuard::new()
                .with_extra(config.security.extra_protected_paths.iter().cloned()),
            executor: CommandExecutor::new(Duration::from_secs(config.tools.shell_timeout_secs)),
            permission,
            bridge,
            http,
            settings,
        })
    }

    pub fn with_permission(mut self, permission: Arc<dyn PermissionGate>) -> Self {
        self.permission = permission;
        self
    }

    pub fn with_bridge(mut self, bridge: Arc<BridgeSession>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_settings(mut self, settings: ToolSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_guard(mut self, guard: FileSystemGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_executor(mut self, executor: CommandExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Absolute, lexically normalized form of a tool-supplied path.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let expanded = if path == "~" || path.starts_with("~/") {
            match dirs::home_dir() {
                Some(home) => home.join(path.trim_start_matches('~').trim_start_matches('/')),
                None => PathBuf::from(path),
            }
        } else {
            PathBuf::from(path)
        };

        if expanded.is_absolute() {
            fs_guard::normalize(&expanded)
        } else {
            fs_guard::normalize(&self.work_dir.join(expanded))
        }
    }

    /// Ask the permission gate; refusal becomes `PermissionDenied`.
    pub async fn request_permission(&self, operation: &str, details: &str) -> Result<(), EngineError> {
        if self.permission.request(operation, details).await {
            debug!("Permission granted for {}", operation);
            Ok(())
        } else {
            warn!("Permission denied for {}: {}", operation, details);
            Err(EngineError::PermissionDenied(details.to_string()))
        }
    }

    /// The bridge, only while it is connected.
    pub fn connected_bridge(&self) -> Option<&Arc<BridgeSession>> {
        self.bridge.as_ref().filter(|b| b.is_connected())
    }

    pub fn display_path<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        match path.strip_prefix(&self.work_dir) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy(),
            _ => path.to_string_lossy(),
        }
    }
}

pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, EngineError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("clio/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| EngineError::Http(format!("Failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Deny;

    #[async_trait]
    impl PermissionGate for Deny {
        async fn request(&self, _operation: &str, _details: &str) -> bool {
            false
        }
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let ctx = ToolContext::new("/work/project");
        assert_eq!(ctx.resolve("src/main.rs"), PathBuf::from("/work/project/src/main.rs"));
        assert_eq!(ctx.resolve("../other/a.txt"), PathBuf::from("/work/other/a.txt"));
        assert_eq!(ctx.resolve("/etc/../etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_display_path() {
        let ctx = ToolContext::new("/work/project");
        assert_eq!(ctx.display_path(Path::new("/work/project/a.rs")), "a.rs");
        assert_eq!(ctx.display_path(Path::new("/tmp/b.rs")), "/tmp/b.rs");
    }

    #[tokio::test]
    async fn test_request_permission_denied() {
        let ctx = ToolContext::new("/tmp").with_permission(Arc::new(Deny));
        let err = ctx
            .request_permission("write_file", "Write 1 bytes to a.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied(_)));
    }
}
